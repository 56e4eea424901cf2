//! The incremental driver: decides full-parse vs. region-reparse for every
//! incoming document version and splices region results into the cached
//! symbol tree.

use crate::cache::{CachedDocument, DocumentCache};
use twbl_syntax::{lexer, Parser};
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct IncrementalSettings {
    /// Documents shorter than this are always parsed in full.
    pub full_parse_threshold_lines: usize,
    /// Fraction of changed lines above which a full parse is cheaper.
    pub changed_fraction: f64,
    /// Context lines added on both sides of the reparse region.
    pub context_lines: u32,
}

impl Default for IncrementalSettings {
    fn default() -> Self {
        Self {
            full_parse_threshold_lines: 50,
            changed_fraction: 0.3,
            context_lines: 3,
        }
    }
}

/// What the driver did with a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    FirstParse,
    Full,
    Incremental { first_line: u32, last_line: u32 },
    Unchanged,
    /// The version was older than the cached one and was ignored.
    Stale,
}

#[derive(Debug, Default)]
pub struct IncrementalDriver {
    pub settings: IncrementalSettings,
    /// Times a region reparse was abandoned for a full parse after the
    /// spliced tree failed validation.
    fallbacks: u64,
}

impl IncrementalDriver {
    #[must_use]
    pub fn new(settings: IncrementalSettings) -> Self {
        Self {
            settings,
            fallbacks: 0,
        }
    }

    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks
    }

    /// Ingest a document version. Versions for a given URI are processed in
    /// strict ascending order; anything older than the cached snapshot is
    /// dropped.
    pub fn update(
        &mut self,
        cache: &mut DocumentCache,
        uri: &Url,
        new_text: &str,
        version: i32,
    ) -> UpdateOutcome {
        let Some(existing) = cache.get_mut(uri) else {
            let parsed = Parser::new(new_text).parse();
            cache.put(CachedDocument::new(
                uri.clone(),
                new_text.to_string(),
                version,
                parsed,
            ));
            return UpdateOutcome::FirstParse;
        };

        if version == existing.version {
            existing.touch();
            return UpdateOutcome::Unchanged;
        }

        if version < existing.version {
            tracing::warn!(
                %uri,
                cached = existing.version,
                received = version,
                "dropping out-of-order document version"
            );
            return UpdateOutcome::Stale;
        }

        let old_lines: Vec<&str> = existing.text.lines().collect();
        let new_lines: Vec<&str> = new_text.lines().collect();

        let changed = changed_lines(&old_lines, &new_lines);

        if new_lines.len() < self.settings.full_parse_threshold_lines {
            return self.full_reparse(existing, new_text, version, changed, UpdateOutcome::Full);
        }

        let too_many = (changed.len() as f64)
            > self.settings.changed_fraction * (new_lines.len().max(1) as f64);

        if too_many || changed.is_empty() {
            return self.full_reparse(existing, new_text, version, changed, UpdateOutcome::Full);
        }

        // Structure-bearing changes invalidate the whole tree: a changed
        // line containing a block keyword or starting a multi-line span can
        // re-shape everything below it.
        let structural = changed.iter().any(|&line| {
            line_is_structural(&old_lines, line) || line_is_structural(&new_lines, line)
        });

        if structural {
            return self.full_reparse(existing, new_text, version, changed, UpdateOutcome::Full);
        }

        let min = *changed.iter().min().expect("changed is non-empty");
        let max = *changed.iter().max().expect("changed is non-empty");
        let first_line = min.saturating_sub(self.settings.context_lines).max(1);
        let last_line = (max + self.settings.context_lines).min(new_lines.len() as u32);

        let line_delta = new_lines.len() as i64 - old_lines.len() as i64;
        let old_last_line = (i64::from(last_line) - line_delta).max(i64::from(first_line)) as u32;

        // Splicing is only sound when no old symbol straddles the region
        // boundary.
        let straddles = existing.parsed.top_level().iter().any(|&id| {
            let range = existing.parsed[id].range;
            let starts_inside = (first_line..=old_last_line).contains(&range.start.line);
            let ends_inside = (first_line..=old_last_line).contains(&range.end.line);
            starts_inside != ends_inside
                || (range.start.line < first_line && range.end.line > old_last_line)
        });

        if straddles {
            return self.full_reparse(existing, new_text, version, changed, UpdateOutcome::Full);
        }

        let region_text = new_lines[(first_line - 1) as usize..last_line as usize].join("\n");
        let donor = Parser::new(&region_text)
            .with_base_line(first_line - 1)
            .parse();

        let insert_at = existing
            .parsed
            .remove_top_level_in_lines(first_line, old_last_line);
        existing
            .parsed
            .shift_lines_after(old_last_line, line_delta as i32);
        existing.parsed.insert_top_level_from(&donor, insert_at);

        // Carry errors from outside the region, shifted, plus the donor's.
        existing
            .parsed
            .errors
            .retain(|e| !(first_line..=old_last_line).contains(&e.range.start.line));
        if line_delta != 0 {
            for e in &mut existing.parsed.errors {
                if e.range.start.line > old_last_line {
                    e.range.start.line =
                        (i64::from(e.range.start.line) + line_delta).max(1) as u32;
                    e.range.end.line = (i64::from(e.range.end.line) + line_delta).max(1) as u32;
                }
            }
        }
        existing.parsed.errors.extend(donor.errors.iter().cloned());

        existing.parsed.set_root_text(new_text);
        existing.parsed.rebuild_line_index();

        if let Err(violation) = existing.parsed.validate() {
            self.fallbacks += 1;
            tracing::warn!(
                %uri,
                %violation,
                fallbacks = self.fallbacks,
                "splice violated tree invariants, falling back to full parse"
            );
            return self.full_reparse(existing, new_text, version, changed, UpdateOutcome::Full);
        }

        existing.text = new_text.to_string();
        existing.version = version;
        existing.changed_lines = changed;
        existing.byte_size = crate::memory::estimate_size(&existing.text, &existing.parsed);
        existing.touch();

        UpdateOutcome::Incremental {
            first_line,
            last_line,
        }
    }

    fn full_reparse(
        &mut self,
        existing: &mut CachedDocument,
        new_text: &str,
        version: i32,
        changed: crate::HashSet<u32>,
        outcome: UpdateOutcome,
    ) -> UpdateOutcome {
        existing.parsed = Parser::new(new_text).parse();
        existing.text = new_text.to_string();
        existing.version = version;
        existing.changed_lines = changed;
        existing.byte_size = crate::memory::estimate_size(&existing.text, &existing.parsed);
        existing.touch();
        outcome
    }
}

/// Positional line diff: lines differing in place, plus everything past the
/// shorter document's end.
fn changed_lines(old: &[&str], new: &[&str]) -> crate::HashSet<u32> {
    let mut changed: crate::HashSet<u32> = Default::default();

    let common = old.len().min(new.len());
    for i in 0..common {
        if old[i] != new[i] {
            changed.insert(i as u32 + 1);
        }
    }
    for i in common..old.len().max(new.len()) {
        changed.insert(i as u32 + 1);
    }

    changed
}

fn line_is_structural(lines: &[&str], line: u32) -> bool {
    let Some(text) = lines.get((line - 1) as usize) else {
        return false;
    };

    let tokens = lexer::tokenize(text);
    tokens.iter().any(|t| t.kind.is_block_structure()) || lexer::begins_continuation(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use twbl_syntax::Parser;

    fn uri() -> Url {
        "file:///calc.twbl".parse().unwrap()
    }

    fn wide_doc(middle: &str) -> String {
        // Wide enough to clear the full-parse threshold.
        let mut lines: Vec<String> = (0..30).map(|i| format!("SUM([A{i}])")).collect();
        lines.push(middle.to_string());
        lines.extend((0..30).map(|i| format!("AVG([B{i}])")));
        lines.join("\n")
    }

    #[test]
    fn first_version_is_a_full_parse() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        let outcome = driver.update(&mut cache, &uri(), "SUM([Sales])", 1);
        assert_eq!(outcome, UpdateOutcome::FirstParse);
        assert!(cache.get(&uri()).is_some());
    }

    #[test]
    fn same_version_reuses_snapshot() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        driver.update(&mut cache, &uri(), "SUM([Sales])", 1);
        let outcome = driver.update(&mut cache, &uri(), "SUM([Sales])", 1);
        assert_eq!(outcome, UpdateOutcome::Unchanged);
    }

    #[test]
    fn older_versions_are_dropped() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        driver.update(&mut cache, &uri(), "SUM([Sales])", 5);
        let outcome = driver.update(&mut cache, &uri(), "AVG([Sales])", 3);
        assert_eq!(outcome, UpdateOutcome::Stale);
        assert_eq!(cache.get(&uri()).unwrap().version, 5);
    }

    #[test]
    fn short_documents_always_parse_fully() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        driver.update(&mut cache, &uri(), "SUM([Sales])", 1);
        let outcome = driver.update(&mut cache, &uri(), "SUM([Profit])", 2);
        assert_eq!(outcome, UpdateOutcome::Full);
    }

    #[test]
    fn single_line_edit_reparses_a_region() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        let before = wide_doc("MIN([Cost])");
        let after = wide_doc("MAX([Cost])");

        driver.update(&mut cache, &uri(), &before, 1);
        let outcome = driver.update(&mut cache, &uri(), &after, 2);

        assert!(matches!(outcome, UpdateOutcome::Incremental { .. }));

        let doc = cache.get(&uri()).unwrap();
        assert!(doc
            .parsed
            .symbols()
            .any(|(_, d)| d.name == "MAX"));
        assert!(!doc.parsed.symbols().any(|(_, d)| d.name == "MIN"));
    }

    #[test]
    fn incremental_matches_full_reparse() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        let before = wide_doc("MIN([Cost])");
        let after = wide_doc("COUNTD([Region])");

        driver.update(&mut cache, &uri(), &before, 1);
        let outcome = driver.update(&mut cache, &uri(), &after, 2);
        assert!(matches!(outcome, UpdateOutcome::Incremental { .. }));

        let spliced = &cache.get(&uri()).unwrap().parsed;
        let full = Parser::new(&after).parse();

        let describe = |doc: &twbl_syntax::ParsedDocument| -> Vec<(String, &'static str, u32)> {
            doc.top_level()
                .iter()
                .map(|&id| {
                    let d = &doc[id];
                    (d.name.clone(), d.kind.tag(), d.range.start.line)
                })
                .collect()
        };

        assert_eq!(describe(spliced), describe(&full));
    }

    #[test]
    fn unterminated_field_reference_forces_full_parse() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        let before = wide_doc("[Cost]");
        // No parens involved: only the open bracket is left dangling, and
        // it would swallow every following line, so a region reparse
        // cannot be equivalent to a full one.
        let after = wide_doc("[Cost");

        driver.update(&mut cache, &uri(), &before, 1);
        let outcome = driver.update(&mut cache, &uri(), &after, 2);
        assert_eq!(outcome, UpdateOutcome::Full);
    }

    #[test]
    fn block_keyword_edits_force_full_parse() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        let before = wide_doc("MIN([Cost])");
        let after = wide_doc("IF [Cost] > 0 THEN 1 ELSE 0 END");

        driver.update(&mut cache, &uri(), &before, 1);
        let outcome = driver.update(&mut cache, &uri(), &after, 2);
        assert_eq!(outcome, UpdateOutcome::Full);
    }

    #[test]
    fn version_only_moves_forward() {
        let mut cache = DocumentCache::default();
        let mut driver = IncrementalDriver::default();

        for v in 1..=4 {
            driver.update(&mut cache, &uri(), &format!("SUM([V{v}])"), v);
            assert_eq!(cache.get(&uri()).unwrap().version, v);
        }
    }
}
