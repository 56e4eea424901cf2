//! Snippet definitions surfaced through completion.
//!
//! Two JSON documents keyed by snippet id; each entry carries a `prefix`,
//! a `body` (string or list of lines, `${n:placeholder}` syntax) and a
//! `description`.

use serde::Deserialize;

const CALCULATION_SNIPPETS: &str = include_str!("../assets/calculations.json");
const LOD_SNIPPETS: &str = include_str!("../assets/lod.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Snippet {
    pub prefix: String,
    pub body: SnippetBody,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SnippetBody {
    Line(String),
    Lines(Vec<String>),
}

impl SnippetBody {
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            SnippetBody::Line(line) => line.clone(),
            SnippetBody::Lines(lines) => lines.join("\n"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SnippetSet {
    snippets: indexmap::IndexMap<String, Snippet>,
}

impl SnippetSet {
    /// Load the snippet documents bundled with the server. A malformed
    /// document is logged and skipped rather than failing startup.
    #[must_use]
    pub fn bundled() -> Self {
        let mut set = Self::default();
        for (name, source) in [
            ("calculations", CALCULATION_SNIPPETS),
            ("lod", LOD_SNIPPETS),
        ] {
            match serde_json::from_str::<indexmap::IndexMap<String, Snippet>>(source) {
                Ok(parsed) => set.snippets.extend(parsed),
                Err(error) => tracing::warn!(document = name, %error, "invalid snippet document"),
            }
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Snippet)> {
        self.snippets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_snippets_load() {
        let set = SnippetSet::bundled();
        assert!(!set.is_empty());
        assert!(set.iter().any(|(id, _)| id == "if-then-else"));
        assert!(set.iter().any(|(id, _)| id == "lod-fixed"));
    }

    #[test]
    fn bodies_join_lines() {
        let set = SnippetSet::bundled();
        let (_, snippet) = set.iter().find(|(id, _)| *id == "if-then-else").unwrap();
        assert!(snippet.body.text().contains('\n'));
        assert!(snippet.body.text().contains("END"));
    }
}
