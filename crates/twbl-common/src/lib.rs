//! Runtime glue shared by the TabCalc language server and CLI.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod environment;
pub mod util;
