//! Syntax layer for TabCalc calculations: lexer, symbol tree and parser.

#![warn(clippy::pedantic)]
#![allow(
    clippy::single_match,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::enum_glob_use,
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions,
    clippy::single_match_else,
    clippy::default_trait_access,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

pub mod lexer;
pub mod line_index;
pub mod mapper;
pub mod parser;
pub mod symbol;

pub use lexer::{tokenize, tokenize_with_trivia, Token, TokenKind};
pub use mapper::{Position, TextRange};
pub use parser::{ParseError, ParseErrorKind, ParsedDocument, Parser};
pub use symbol::{SymbolData, SymbolId, SymbolKind};

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
