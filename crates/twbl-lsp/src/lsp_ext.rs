//! Non-standard requests used by the editor extension for troubleshooting.

pub mod request {
    use lsp_types::{request::Request, Url};
    use serde::{Deserialize, Serialize};

    pub enum SyntaxTree {}

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SyntaxTreeParams {
        pub uri: Url,
    }

    #[derive(Serialize, Deserialize)]
    pub struct SyntaxTreeResult {
        /// Text representation of the symbol tree.
        pub text: String,
        /// JSON representation of the symbol tree.
        pub tree: serde_json::Value,
    }

    impl Request for SyntaxTree {
        type Params = SyntaxTreeParams;

        type Result = Option<SyntaxTreeResult>;

        const METHOD: &'static str = "tabcalc/syntaxTree";
    }
}
