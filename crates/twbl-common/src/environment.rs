use async_trait::async_trait;
use futures::Future;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod native;

/// The runtime surface the calculation server actually touches, kept
/// behind a trait so the analysis code stays runtime-agnostic and the
/// timed paths are testable.
///
/// Three concerns:
/// - timers and background tasks, for the request scheduler's debounce
///   windows and the memory manager's periodic pass;
/// - reading definition and calculation files, for the catalogue and the
///   formatter;
/// - locating calculation files on disk, for the CLI formatter's file
///   collection.
#[async_trait(?Send)]
pub trait Environment: Clone + Send + Sync + 'static {
    /// Run a task on the current thread, alongside the server loop.
    fn spawn_local<F>(&self, fut: F)
    where
        F: Future + 'static;

    async fn sleep(&self, duration: Duration);

    /// Read a definition or calculation file.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, anyhow::Error>;

    /// Write a formatted calculation back to disk.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), anyhow::Error>;

    /// Absolute current working dir.
    fn cwd(&self) -> Option<PathBuf>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Expand a glob over calculation files.
    fn glob_files(&self, glob: &str) -> Result<Vec<PathBuf>, anyhow::Error>;
}
