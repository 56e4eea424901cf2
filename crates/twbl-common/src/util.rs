use std::path::{Path, PathBuf};
use url::Url;

/// Strip Windows verbatim prefixes so paths and URLs compare cleanly.
pub trait Normalize {
    #[must_use]
    fn normalize(self) -> Self;
}

impl Normalize for PathBuf {
    fn normalize(self) -> Self {
        let s = self.to_string_lossy();
        match s.strip_prefix(r"\\?\") {
            Some(stripped) => PathBuf::from(stripped),
            None => self,
        }
    }
}

impl Normalize for Url {
    fn normalize(self) -> Self {
        if self.scheme() != "file" {
            return self;
        }

        let s = self.as_str().replace("%3A", ":").replace("%5C", "/");
        s.parse().unwrap_or(self)
    }
}

/// Glob pattern matching every calculation file below a directory.
#[must_use]
pub fn calculation_glob(dir: &Path) -> String {
    dir.join("**/*.twbl").to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim_prefix_is_stripped() {
        let p = PathBuf::from(r"\\?\C:\calcs").normalize();
        assert_eq!(p, PathBuf::from(r"C:\calcs"));
    }

    #[test]
    fn non_file_urls_pass_through() {
        let url: Url = "untitled:Untitled-1".parse().unwrap();
        assert_eq!(url.clone().normalize(), url);
    }
}
