//! Analysis engine for TabCalc documents: the per-document cache, the
//! incremental parse driver, the memory manager, the definition catalogue
//! and the diagnostics pass.

#![warn(clippy::pedantic)]
#![allow(
    clippy::single_match,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::enum_glob_use,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions,
    clippy::single_match_else,
    clippy::default_trait_access,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod cache;
pub mod catalog;
pub mod derived;
pub mod diagnostics;
pub mod incremental;
pub mod memory;

pub use cache::{CachedDocument, DocumentCache};
pub use catalog::{Catalog, FunctionSignature, TypeDef};
pub use derived::{DerivedCache, DerivedKey};
pub use diagnostics::{Diagnostic, DiagnosticsSettings, Severity};
pub use incremental::{IncrementalDriver, IncrementalSettings, UpdateOutcome};
pub use memory::{MemoryManager, MemorySettings};

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
pub(crate) type HashSet<T> = std::collections::HashSet<T, ahash::RandomState>;
pub(crate) type IndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;
