use super::Environment;
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Tokio-backed environment used by the `twbl` binary.
#[derive(Debug, Clone)]
pub struct NativeEnvironment;

#[async_trait(?Send)]
impl Environment for NativeEnvironment {
    fn spawn_local<F>(&self, fut: F)
    where
        F: futures::Future + 'static,
    {
        tokio::task::spawn_local(fut);
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, anyhow::Error> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), anyhow::Error> {
        Ok(tokio::fs::write(path, bytes).await?)
    }

    fn cwd(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn glob_files(&self, pattern: &str) -> Result<Vec<PathBuf>, anyhow::Error> {
        // Calculation files are matched case-sensitively; broken symlinks
        // and unreadable entries are skipped rather than failing the run.
        let paths = glob::glob_with(
            pattern,
            glob::MatchOptions {
                case_sensitive: true,
                ..Default::default()
            },
        )?;
        Ok(paths.filter_map(Result::ok).collect())
    }
}
