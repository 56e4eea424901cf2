//! The per-document analysis cache: the single source of truth for parsed
//! state. Feature providers read from it and never mutate it; only the
//! incremental driver and the memory manager write.

use crate::{diagnostics::Diagnostic, HashSet};
use std::time::Instant;
use twbl_syntax::ParsedDocument;
use url::Url;

#[derive(Debug)]
pub struct CachedDocument {
    pub uri: Url,
    pub text: String,
    pub version: i32,
    pub parsed: ParsedDocument,
    pub diagnostics: Vec<Diagnostic>,
    pub last_access: Instant,
    pub access_count: u64,
    /// Whether the editor currently holds this document open.
    pub active: bool,
    /// Estimated footprint in bytes, maintained by the memory manager.
    pub byte_size: u64,
    /// Lines touched by the latest change, 1-based.
    pub changed_lines: HashSet<u32>,
}

impl CachedDocument {
    #[must_use]
    pub fn new(uri: Url, text: String, version: i32, parsed: ParsedDocument) -> Self {
        let byte_size = crate::memory::estimate_size(&text, &parsed);
        Self {
            uri,
            text,
            version,
            parsed,
            diagnostics: Vec::new(),
            last_access: Instant::now(),
            access_count: 1,
            active: true,
            byte_size,
            changed_lines: Default::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
        self.access_count += 1;
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// URI-keyed cache with bounded capacity. When full, the least recently
/// used inactive entry makes way; active entries are never displaced.
#[derive(Debug)]
pub struct DocumentCache {
    entries: crate::IndexMap<Url, CachedDocument>,
    capacity: usize,
}

pub const DEFAULT_CAPACITY: usize = 50;

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DocumentCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Default::default(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<&CachedDocument> {
        self.entries.get(uri)
    }

    pub fn get_mut(&mut self, uri: &Url) -> Option<&mut CachedDocument> {
        self.entries.get_mut(uri)
    }

    /// Updates access time and count, returning the entry.
    pub fn touch(&mut self, uri: &Url) -> Option<&CachedDocument> {
        let doc = self.entries.get_mut(uri)?;
        doc.touch();
        Some(doc)
    }

    pub fn put(&mut self, doc: CachedDocument) {
        if !self.entries.contains_key(&doc.uri) && self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(doc.uri.clone(), doc);
    }

    pub fn delete(&mut self, uri: &Url) -> Option<CachedDocument> {
        self.entries.shift_remove(uri)
    }

    pub fn mark_active(&mut self, uri: &Url) {
        if let Some(doc) = self.entries.get_mut(uri) {
            doc.active = true;
        }
    }

    pub fn mark_inactive(&mut self, uri: &Url) {
        if let Some(doc) = self.entries.get_mut(uri) {
            doc.active = false;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Url, &CachedDocument)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Url, &mut CachedDocument)> {
        self.entries.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
        for (_, doc) in self.entries.iter_mut() {
            doc.diagnostics.shrink_to_fit();
            doc.changed_lines.shrink_to_fit();
        }
    }

    /// Drop the least recently used inactive entry, if there is one. The
    /// cache may exceed its capacity while every entry is active.
    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .filter(|(_, doc)| !doc.active)
            .min_by_key(|(_, doc)| doc.last_access)
            .map(|(uri, _)| uri.clone());

        if let Some(uri) = victim {
            tracing::debug!(%uri, "evicting document to respect cache capacity");
            self.entries.shift_remove(&uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twbl_syntax::Parser;

    fn doc(n: usize, active: bool) -> CachedDocument {
        let uri: Url = format!("file:///calc{n}.twbl").parse().unwrap();
        let mut d = CachedDocument::new(uri, "1".into(), 1, Parser::new("1").parse());
        d.active = active;
        d
    }

    #[test]
    fn capacity_evicts_inactive_lru() {
        let mut cache = DocumentCache::new(2);
        cache.put(doc(1, false));
        cache.put(doc(2, false));
        cache.put(doc(3, false));

        assert_eq!(cache.len(), 2);
        assert!(cache
            .get(&"file:///calc1.twbl".parse().unwrap())
            .is_none());
    }

    #[test]
    fn active_documents_survive_capacity_pressure() {
        let mut cache = DocumentCache::new(2);
        cache.put(doc(1, true));
        cache.put(doc(2, true));
        cache.put(doc(3, true));

        // Nothing evictable: the cache runs over capacity instead.
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&"file:///calc1.twbl".parse().unwrap()).is_some());
    }

    #[test]
    fn touch_updates_access_count() {
        let mut cache = DocumentCache::default();
        cache.put(doc(1, true));
        let uri: Url = "file:///calc1.twbl".parse().unwrap();

        let before = cache.get(&uri).unwrap().access_count;
        cache.touch(&uri);
        assert_eq!(cache.get(&uri).unwrap().access_count, before + 1);
    }
}
