mod code_actions;
mod completion;
mod configuration;
mod debug;
mod documents;
mod folding_ranges;
mod formatting;
mod goto;
mod hover;
mod initialize;
mod references;
mod semantic_tokens;
mod signature_help;
mod symbols;

pub(crate) use code_actions::code_actions;
pub(crate) use completion::completion;
pub(crate) use configuration::configuration_change;
pub(crate) use debug::syntax_tree;
pub(crate) use documents::{document_change, document_close, document_open, document_save};
pub(crate) use folding_ranges::folding_ranges;
pub(crate) use formatting::formatting;
pub(crate) use goto::goto_definition;
pub(crate) use hover::hover;
pub(crate) use initialize::{initialize, initialized, shutdown};
pub(crate) use references::references;
pub(crate) use semantic_tokens::semantic_tokens;
pub(crate) use signature_help::signature_help;
pub(crate) use symbols::{document_symbols, workspace_symbols};
