//! Formatter for TabCalc calculations.

#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::single_match_else,
    clippy::enum_glob_use
)]

mod algorithm;

pub mod options;

pub use algorithm::Formatter;
pub use options::Options;

/// Format a full calculation source string.
#[must_use]
pub fn format_source(src: &str, options: Options) -> String {
    Formatter::new(src, options).format()
}
