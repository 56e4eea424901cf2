use clap::{crate_version, ArgEnum, Args, Parser, Subcommand};

#[derive(Clone, Parser)]
#[clap(name = "twbl")]
#[clap(bin_name = "twbl")]
#[clap(version = crate_version!())]
pub struct TwblArgs {
    #[clap(long, arg_enum, global = true, default_value = "auto")]
    pub colors: Colors,
    /// Enable a verbose logging format.
    #[clap(long, global = true)]
    pub verbose: bool,
    /// Enable logging spans.
    #[clap(long, global = true)]
    pub log_spans: bool,
    #[clap(subcommand)]
    pub cmd: RootCommand,
}

#[derive(Clone, Subcommand)]
pub enum RootCommand {
    /// Language server operations.
    Lsp {
        #[clap(subcommand)]
        cmd: LspCommand,
    },
    /// Format calculation files.
    Fmt(FmtCommand),
}

#[derive(Clone, Subcommand)]
pub enum LspCommand {
    /// Run the language server and listen on a TCP address.
    Tcp {
        /// The address to listen on.
        #[clap(long, default_value = "0.0.0.0:9182")]
        address: String,
    },
    /// Run the language server over the standard input and output.
    Stdio {},
}

#[derive(Clone, Args)]
pub struct FmtCommand {
    /// A file, directory or glob of calculation files to format. Defaults
    /// to every `.twbl` file under the current directory.
    pub files: Option<String>,
    /// Report files that would change without rewriting them.
    #[clap(long)]
    pub check: bool,
    /// Format files even when they contain syntax errors.
    #[clap(long)]
    pub force: bool,
}

#[derive(Clone, Copy, ArgEnum)]
pub enum Colors {
    /// Determine whether to colorize output automatically.
    Auto,
    /// Always colorize output.
    Always,
    /// Never colorize output.
    Never,
}
