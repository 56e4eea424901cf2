use twbl_analysis::{
    diagnostics, Catalog, DocumentCache, IncrementalDriver, MemoryManager, MemorySettings,
    Severity, UpdateOutcome,
};
use twbl_syntax::Parser;
use url::Url;

fn uri(n: usize) -> Url {
    format!("file:///calc{n}.twbl").parse().unwrap()
}

fn analyze(cache: &mut DocumentCache, target: &Url, catalog: &Catalog) {
    let doc = cache.get_mut(target).unwrap();
    doc.diagnostics = diagnostics::compute(
        &doc.text,
        &doc.parsed,
        catalog,
        &diagnostics::DiagnosticsSettings::default(),
    );
}

#[test]
fn edit_session_keeps_cache_and_diagnostics_fresh() {
    let catalog = Catalog::builtin();
    let mut cache = DocumentCache::default();
    let mut driver = IncrementalDriver::default();
    let target = uri(1);

    driver.update(&mut cache, &target, "IF [Sales] > 100 THEN 1", 1);
    analyze(&mut cache, &target, &catalog);
    assert!(cache
        .get(&target)
        .unwrap()
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error));

    driver.update(&mut cache, &target, "IF [Sales] > 100 THEN 1 ELSE 0 END", 2);
    analyze(&mut cache, &target, &catalog);
    let doc = cache.get(&target).unwrap();
    assert_eq!(doc.version, 2);
    assert!(doc.diagnostics.is_empty(), "unexpected: {:?}", doc.diagnostics);
}

#[test]
fn incremental_path_equals_full_reparse() {
    let mut lines: Vec<String> = (0..40).map(|i| format!("SUM([A{i}])")).collect();
    lines.push("AVG([Mid])".to_string());
    lines.extend((0..40).map(|i| format!("MIN([B{i}])")));
    let before = lines.join("\n");

    lines[40] = "COUNTD([Mid])".to_string();
    let after = lines.join("\n");

    let mut cache = DocumentCache::default();
    let mut driver = IncrementalDriver::default();
    let target = uri(1);

    driver.update(&mut cache, &target, &before, 1);
    let outcome = driver.update(&mut cache, &target, &after, 2);
    assert!(matches!(outcome, UpdateOutcome::Incremental { .. }));

    let incremental = &cache.get(&target).unwrap().parsed;
    let full = Parser::new(&after).parse();

    let shape = |doc: &twbl_syntax::ParsedDocument| -> Vec<(String, u32, u32)> {
        doc.top_level()
            .iter()
            .map(|&id| {
                let d = &doc[id];
                (
                    d.name.clone(),
                    d.range.start.line,
                    d.range.start.character,
                )
            })
            .collect()
    };

    assert_eq!(shape(incremental), shape(&full));
    assert_eq!(driver.fallback_count(), 0);
}

#[test]
fn eviction_never_removes_active_documents() {
    let manager = MemoryManager::new(MemorySettings {
        cleanup_bytes: 1,
        ..MemorySettings::default()
    });
    let mut cache = DocumentCache::default();
    let mut driver = IncrementalDriver::default();

    for n in 0..6 {
        driver.update(&mut cache, &uri(n), "SUM([Sales])", 1);
        if n % 2 == 0 {
            cache.mark_inactive(&uri(n));
        }
    }

    let active_before: Vec<Url> = cache
        .iter()
        .filter(|(_, d)| d.active)
        .map(|(u, _)| u.clone())
        .collect();

    let report = manager.run(&mut cache);

    for active in &active_before {
        assert!(cache.get(active).is_some(), "{active} was evicted");
    }
    assert!(report.evicted.iter().all(|u| !active_before.contains(u)));
}

#[test]
fn large_documents_parse_in_one_pass() {
    let source = (0..10_000)
        .map(|i| format!("SUM([Field{i}])"))
        .collect::<Vec<_>>()
        .join("\n");

    let parsed = Parser::new(&source).parse();
    assert_eq!(parsed.top_level().len(), 10_000);
    parsed.validate().unwrap();
}

#[test]
fn reopened_document_is_marked_active_again() {
    let mut cache = DocumentCache::default();
    let mut driver = IncrementalDriver::default();
    let target = uri(1);

    driver.update(&mut cache, &target, "SUM([Sales])", 1);
    cache.mark_inactive(&target);
    assert!(!cache.get(&target).unwrap().active);

    cache.mark_active(&target);
    assert!(cache.get(&target).unwrap().active);
}
