//! Memory accounting and eviction for the document cache.
//!
//! The manager keeps a running byte estimate per document and runs eviction
//! passes when the total crosses the configured thresholds. Active
//! documents are never evicted; oversized active documents are flagged and
//! preserved so the editor keeps analysis for whatever the user is looking
//! at.

use crate::cache::DocumentCache;
use std::time::Duration;
use twbl_syntax::ParsedDocument;
use url::Url;

const BYTES_PER_SYMBOL: u64 = 96;
const BYTES_PER_INDEXED_LINE: u64 = 32;

#[derive(Debug, Clone, Copy)]
pub struct MemorySettings {
    /// Total estimate above which a normal eviction pass runs.
    pub cleanup_bytes: u64,
    /// Total estimate above which the pass turns aggressive.
    pub aggressive_bytes: u64,
    /// Largest footprint a single document may reach.
    pub per_document_cap: u64,
    /// How often the periodic task runs.
    pub tick: Duration,
    pub w_time: f64,
    pub w_access: f64,
    pub w_size: f64,
    /// Fraction of scored entries removed by a normal pass.
    pub normal_fraction: f64,
    /// Fraction removed by an aggressive pass.
    pub aggressive_fraction: f64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            cleanup_bytes: 80 * 1024 * 1024,
            aggressive_bytes: 120 * 1024 * 1024,
            per_document_cap: 50 * 1024 * 1024,
            tick: Duration::from_secs(30),
            w_time: 1.0,
            w_access: 2.0,
            w_size: 0.5,
            normal_fraction: 0.3,
            aggressive_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Normal,
    Aggressive,
}

/// What one manager run did, for logging and tests.
#[derive(Debug, Default)]
pub struct EvictionReport {
    pub pass: Option<PassKind>,
    pub evicted: Vec<Url>,
    /// Active documents over the per-document cap, preserved but reported.
    pub flagged: Vec<Url>,
    pub used_bytes: u64,
}

/// Estimated footprint of one cached document.
#[must_use]
pub fn estimate_size(text: &str, parsed: &ParsedDocument) -> u64 {
    text.len() as u64 * 2
        + parsed.symbol_count() as u64 * BYTES_PER_SYMBOL
        + parsed.line_index.line_count() as u64 * BYTES_PER_INDEXED_LINE
}

#[derive(Debug, Default)]
pub struct MemoryManager {
    pub settings: MemorySettings,
}

impl MemoryManager {
    #[must_use]
    pub fn new(settings: MemorySettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn used_bytes(&self, cache: &DocumentCache) -> u64 {
        cache.iter().map(|(_, doc)| doc.byte_size).sum()
    }

    /// Removal priority: higher means evicted earlier. Active documents are
    /// pinned at zero and never evicted.
    #[must_use]
    pub fn priority(&self, doc: &crate::cache::CachedDocument) -> f64 {
        if doc.active {
            return 0.0;
        }

        let age_minutes = (doc.last_access.elapsed().as_secs_f64() / 60.0).min(30.0);
        let access = 1.0 / doc.access_count.max(1) as f64;
        let size_mb = doc.byte_size as f64 / (1024.0 * 1024.0);

        self.settings.w_time * age_minutes
            + self.settings.w_access * access
            + self.settings.w_size * size_mb
    }

    /// One full manager run: per-document caps, then a threshold-driven
    /// eviction pass.
    pub fn run(&self, cache: &mut DocumentCache) -> EvictionReport {
        let mut report = EvictionReport::default();

        self.enforce_document_caps(cache, &mut report);

        report.used_bytes = self.used_bytes(cache);

        let pass = if report.used_bytes >= self.settings.aggressive_bytes {
            Some(PassKind::Aggressive)
        } else if report.used_bytes >= self.settings.cleanup_bytes {
            Some(PassKind::Normal)
        } else {
            None
        };

        if let Some(kind) = pass {
            self.eviction_pass(cache, kind, &mut report);
            report.pass = Some(kind);
            report.used_bytes = self.used_bytes(cache);
        }

        if report.pass == Some(PassKind::Aggressive) {
            // No collector to nudge here; returning slack to the allocator
            // is the closest equivalent.
            cache.shrink_to_fit();
        }

        if !report.evicted.is_empty() || !report.flagged.is_empty() {
            tracing::info!(
                evicted = report.evicted.len(),
                flagged = report.flagged.len(),
                used_bytes = report.used_bytes,
                "memory manager pass finished"
            );
        }

        report
    }

    fn enforce_document_caps(&self, cache: &mut DocumentCache, report: &mut EvictionReport) {
        let offenders: Vec<(Url, bool)> = cache
            .iter()
            .filter(|(_, doc)| doc.byte_size > self.settings.per_document_cap)
            .map(|(uri, doc)| (uri.clone(), doc.active))
            .collect();

        for (uri, active) in offenders {
            if active {
                tracing::warn!(%uri, "active document exceeds the per-document cap");
                report.flagged.push(uri);
            } else {
                cache.delete(&uri);
                report.evicted.push(uri);
            }
        }
    }

    fn eviction_pass(&self, cache: &mut DocumentCache, kind: PassKind, report: &mut EvictionReport) {
        let fraction = match kind {
            PassKind::Normal => self.settings.normal_fraction,
            PassKind::Aggressive => self.settings.aggressive_fraction,
        };

        let mut scored: Vec<(Url, f64)> = cache
            .iter()
            .map(|(uri, doc)| (uri.clone(), self.priority(doc)))
            .filter(|(_, p)| *p > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let count = ((scored.len() as f64 * fraction).ceil() as usize).min(scored.len());

        for (uri, _) in scored.into_iter().take(count) {
            cache.delete(&uri);
            report.evicted.push(uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedDocument;
    use twbl_syntax::Parser;

    fn doc(n: usize, active: bool, size: u64) -> CachedDocument {
        let uri: Url = format!("file:///calc{n}.twbl").parse().unwrap();
        let mut d = CachedDocument::new(uri, "1".into(), 1, Parser::new("1").parse());
        d.active = active;
        d.byte_size = size;
        d
    }

    fn tight_settings() -> MemorySettings {
        MemorySettings {
            cleanup_bytes: 100,
            aggressive_bytes: 1000,
            per_document_cap: 10_000,
            ..MemorySettings::default()
        }
    }

    #[test]
    fn no_pass_below_threshold() {
        let manager = MemoryManager::new(tight_settings());
        let mut cache = DocumentCache::default();
        cache.put(doc(1, false, 10));

        let report = manager.run(&mut cache);
        assert_eq!(report.pass, None);
        assert!(report.evicted.is_empty());
    }

    #[test]
    fn normal_pass_evicts_top_fraction() {
        let manager = MemoryManager::new(tight_settings());
        let mut cache = DocumentCache::default();
        for n in 0..10 {
            cache.put(doc(n, false, 50));
        }

        let report = manager.run(&mut cache);
        assert_eq!(report.pass, Some(PassKind::Normal));
        assert_eq!(report.evicted.len(), 3);
        assert_eq!(cache.len(), 7);
    }

    #[test]
    fn aggressive_pass_evicts_half() {
        let manager = MemoryManager::new(tight_settings());
        let mut cache = DocumentCache::default();
        for n in 0..10 {
            cache.put(doc(n, false, 200));
        }

        let report = manager.run(&mut cache);
        assert_eq!(report.pass, Some(PassKind::Aggressive));
        assert_eq!(report.evicted.len(), 5);
    }

    #[test]
    fn active_documents_are_never_evicted() {
        let manager = MemoryManager::new(tight_settings());
        let mut cache = DocumentCache::default();
        for n in 0..4 {
            cache.put(doc(n, true, 500));
        }
        cache.put(doc(99, false, 500));

        let report = manager.run(&mut cache);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(cache.len(), 4);
        for n in 0..4 {
            let uri: Url = format!("file:///calc{n}.twbl").parse().unwrap();
            assert!(cache.get(&uri).is_some());
        }
    }

    #[test]
    fn oversized_inactive_documents_go_immediately() {
        let manager = MemoryManager::new(MemorySettings {
            per_document_cap: 100,
            ..tight_settings()
        });
        let mut cache = DocumentCache::default();
        cache.put(doc(1, false, 500));
        cache.put(doc(2, true, 500));

        let report = manager.run(&mut cache);
        assert!(report
            .evicted
            .contains(&"file:///calc1.twbl".parse().unwrap()));
        assert!(report
            .flagged
            .contains(&"file:///calc2.twbl".parse().unwrap()));
        assert!(cache.get(&"file:///calc2.twbl".parse().unwrap()).is_some());
    }

    #[test]
    fn priority_is_zero_for_active_documents() {
        let manager = MemoryManager::default();
        let active = doc(1, true, 10_000);
        let inactive = doc(2, false, 10_000);

        assert_eq!(manager.priority(&active), 0.0);
        assert!(manager.priority(&inactive) > 0.0);
    }
}
