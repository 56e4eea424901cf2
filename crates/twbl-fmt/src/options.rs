use serde::{Deserialize, Serialize};

/// Formatting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// The string used for one level of indentation.
    pub indent_string: String,
    /// Argument lists longer than this go one-argument-per-line.
    pub max_inline_arguments: usize,
    /// End the output with a newline.
    pub trailing_newline: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            indent_string: "    ".to_string(),
            max_inline_arguments: 2,
            trailing_newline: true,
        }
    }
}

impl Options {
    /// Derive the indent string from editor-provided settings.
    #[must_use]
    pub fn with_editor_settings(mut self, tab_size: u32, insert_spaces: bool) -> Self {
        self.indent_string = if insert_spaces {
            " ".repeat(tab_size.max(1) as usize)
        } else {
            "\t".to_string()
        };
        self
    }
}
