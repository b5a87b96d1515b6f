//! Historical backfill, watermark seeding, and enrichment flows.

mod common;

use common::*;
use navsync_core::data::TaskError;
use navsync_runner::{ConfigError, RunError};
use std::collections::HashSet;
use std::sync::Arc;

// ── Historical backfill ──────────────────────────────────────────────

#[test]
fn historical_backfills_explicit_subjects_ignoring_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_watermark(&config, r#"{"100": "26-07-2024", "900": "01-07-2024"}"#);

    let source = Arc::new(
        MockSource::new().with("100", Ok(payload("100", &["26-07-2024", "25-07-2024", "24-07-2024"]))),
    );
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    let outcome = orch.run_historical(vec!["100".into()]).unwrap();

    assert_eq!(outcome.attempted, 1);
    assert_eq!(sink.dates()["100"].len(), 3);
    assert_eq!(source.urls(), vec![format!("{BASE}/100")]);

    let wm = orch.store().load().unwrap();
    assert_eq!(wm.get("100"), Some("26-07-2024"));
    assert_eq!(wm.get("900"), Some("01-07-2024"));
}

#[test]
fn historical_without_subjects_uses_catalog_and_creates_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let source = Arc::new(
        MockSource::new()
            .with_catalog(vec![catalog_entry("100", None), catalog_entry("200", None)])
            .with("100", Ok(payload("100", &["26-07-2024"])))
            .with("200", Ok(payload("200", &["20-07-2024"]))),
    );
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    orch.run_historical(Vec::new()).unwrap();

    let wm = orch.store().load().unwrap();
    assert_eq!(wm.len(), 2);
    assert_eq!(wm.get("200"), Some("20-07-2024"));
}

#[test]
fn historical_never_moves_watermark_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_watermark(&config, r#"{"100": "26-07-2024"}"#);

    let source = Arc::new(MockSource::new().with("100", Ok(payload("100", &["01-07-2024"]))));
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    orch.run_historical(vec!["100".into()]).unwrap();
    assert_eq!(orch.store().load().unwrap().get("100"), Some("26-07-2024"));
}

// ── Seed watermark ───────────────────────────────────────────────────

#[test]
fn seed_writes_latest_dates_inside_window_without_touching_sink() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.acceptance.min_year = Some(2023);

    let source = Arc::new(
        MockSource::new()
            .with_catalog(vec![
                catalog_entry("100", None),
                catalog_entry("200", None),
                catalog_entry("600", None),
            ])
            .with("100", Ok(payload("100", &["26-07-2024", "25-07-2024"])))
            .with("200", Err(transport_error("200")))
            .with("600", Ok(payload("600", &["31-03-2019"]))),
    );
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    let outcome = orch.seed_watermark().unwrap();

    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.rejected_by_window, 1);
    assert!(matches!(outcome.errors["200"], TaskError::Transport { .. }));
    assert!(source.urls().iter().all(|u| u.ends_with("/latest")));
    assert!(sink.chunks.lock().unwrap().is_empty());

    let wm = orch.store().load().unwrap();
    assert_eq!(wm.len(), 1);
    assert_eq!(wm.get("100"), Some("26-07-2024"));
}

#[test]
fn seed_counts_duplicate_catalog_codes_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let source = Arc::new(
        MockSource::new()
            .with_catalog(vec![catalog_entry("100", None), catalog_entry("100", None)])
            .with("100", Ok(payload("100", &["26-07-2024"]))),
    );
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    let outcome = orch.seed_watermark().unwrap();

    assert_eq!(outcome.attempted, 1);
    assert_eq!(source.urls(), vec![format!("{BASE}/100/latest")]);
}

// ── Enrichment ───────────────────────────────────────────────────────

#[test]
fn enrichment_fetches_subjects_with_isin() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let source = Arc::new(MockSource::new().with_catalog(vec![
        catalog_entry("100", Some("INF000000001")),
        catalog_entry("200", Some("  ")),
        catalog_entry("300", None),
        catalog_entry("400", Some("INF000000004")),
    ]));
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));

    let outcome = orch
        .run_enrichment(&MockEnrichment::default(), "isinGrowth")
        .unwrap();

    assert_eq!(outcome.attempted, 2);
    let written = sink.enrichment.lock().unwrap();
    let subjects: HashSet<_> = written
        .iter()
        .flat_map(|(category, records)| {
            assert_eq!(category, "isinGrowth");
            records.iter().map(|r| r.subject_id.clone())
        })
        .collect();
    assert_eq!(subjects, HashSet::from(["100".to_string(), "400".to_string()]));
}

#[test]
fn enrichment_errors_fail_the_run_after_writing_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let source = Arc::new(MockSource::new().with_catalog(vec![
        catalog_entry("100", Some("INF000000001")),
        catalog_entry("400", Some("INF000000004")),
    ]));
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config, &source, &sink, d(2024, 7, 27));
    let enrichment = MockEnrichment {
        failing: HashSet::from(["INF000000004".to_string()]),
    };

    let err = orch.run_enrichment(&enrichment, "isinGrowth").unwrap_err();
    let RunError::Failed { failed, outcome } = err else {
        panic!("expected Failed");
    };
    assert_eq!(failed, 1);
    assert!(outcome.errors.contains_key("400"));
    assert_eq!(sink.enrichment.lock().unwrap().len(), 1);
}

#[test]
fn unknown_operation_is_a_config_error_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    let sink = Arc::new(MemorySink::default());
    let orch = orchestrator(config(dir.path()), &source, &sink, d(2024, 7, 27));

    let err = orch
        .run_enrichment(&MockEnrichment::default(), "isinBonus")
        .unwrap_err();
    assert!(matches!(err, RunError::Config(ConfigError::Invalid(_))));
    assert_eq!(*source.catalog_calls.lock().unwrap(), 0);
}
