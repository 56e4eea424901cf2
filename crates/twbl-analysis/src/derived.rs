//! A small version-stamped cache for provider results.
//!
//! Every feature provider keys its results by `(uri, position, version)`;
//! invalidating a document is one stamp bump rather than clearing several
//! maps.

use twbl_syntax::Position;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub uri: Url,
    pub position: Option<Position>,
    pub version: i32,
}

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct DerivedCache<T> {
    capacity: usize,
    entries: crate::IndexMap<DerivedKey, (u64, T)>,
    stamps: crate::HashMap<Url, u64>,
}

impl<T> Default for DerivedCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> DerivedCache<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Default::default(),
            stamps: Default::default(),
        }
    }

    fn stamp_of(&self, uri: &Url) -> u64 {
        self.stamps.get(uri).copied().unwrap_or(0)
    }

    /// Invalidate every entry of the document by bumping its stamp.
    pub fn bump(&mut self, uri: &Url) {
        *self.stamps.entry(uri.clone()).or_insert(0) += 1;
    }

    /// Forget the document entirely; called when it leaves the cache.
    pub fn forget(&mut self, uri: &Url) {
        self.stamps.remove(uri);
        self.entries.retain(|key, _| &key.uri != uri);
    }

    #[must_use]
    pub fn get(&self, key: &DerivedKey) -> Option<&T> {
        let (stamp, value) = self.entries.get(key)?;
        (*stamp == self.stamp_of(&key.uri)).then_some(value)
    }

    pub fn insert(&mut self, key: DerivedKey, value: T) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.shift_remove_index(0);
        }
        let stamp = self.stamp_of(&key.uri);
        self.entries.insert(key, (stamp, value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(version: i32) -> DerivedKey {
        DerivedKey {
            uri: "file:///calc.twbl".parse().unwrap(),
            position: Some(Position::new(1, 4)),
            version,
        }
    }

    #[test]
    fn caches_until_bumped() {
        let mut cache: DerivedCache<String> = DerivedCache::default();
        cache.insert(key(1), "hover text".into());

        assert_eq!(cache.get(&key(1)), Some(&"hover text".to_string()));

        cache.bump(&key(1).uri);
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn distinct_versions_are_distinct_entries() {
        let mut cache: DerivedCache<u32> = DerivedCache::default();
        cache.insert(key(1), 10);
        cache.insert(key(2), 20);

        assert_eq!(cache.get(&key(1)), Some(&10));
        assert_eq!(cache.get(&key(2)), Some(&20));
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut cache: DerivedCache<u32> = DerivedCache::new(2);
        cache.insert(key(1), 1);
        cache.insert(key(2), 2);
        cache.insert(key(3), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.get(&key(3)), Some(&3));
    }
}
