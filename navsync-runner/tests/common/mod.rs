//! In-process stand-ins for the NAV API, the enrichment API, and the sink.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use navsync_core::data::sink::committed_dates;
use navsync_core::data::{
    EnrichmentRecord, EnrichmentSource, NavSource, Sink, SinkError, TaskError,
};
use navsync_core::{
    CatalogEntry, Chunk, EnrichTask, FixedClock, Payload, RawRecord, SchemeMeta, SubjectId, Task,
};
use navsync_runner::{Orchestrator, PipelineConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://api.mfapi.in/mf";

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Payload with `dates` as served (newest first in real life).
pub fn payload(code: &str, dates: &[&str]) -> Payload {
    Payload {
        meta: SchemeMeta {
            scheme_code: Some(code.to_string()),
            scheme_name: Some(format!("Scheme {code} - Growth")),
            ..SchemeMeta::default()
        },
        data: dates
            .iter()
            .map(|date| RawRecord {
                date: date.to_string(),
                value: Some(serde_json::json!("10.0000")),
            })
            .collect(),
        status: Some("SUCCESS".into()),
    }
}

pub fn catalog_entry(code: &str, isin_growth: Option<&str>) -> CatalogEntry {
    CatalogEntry {
        scheme_code: code.to_string(),
        scheme_name: Some(format!("Scheme {code}")),
        isin_growth: isin_growth.map(str::to_string),
        isin_div_reinvestment: None,
    }
}

pub fn transport_error(code: &str) -> TaskError {
    TaskError::Transport {
        url: format!("{BASE}/{code}"),
        message: "operation timed out".into(),
    }
}

// ── NAV source ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSource {
    payloads: HashMap<SubjectId, Result<Payload, TaskError>>,
    catalog: Vec<CatalogEntry>,
    pub requested: Mutex<Vec<String>>,
    pub catalog_calls: Mutex<usize>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: &str, result: Result<Payload, TaskError>) -> Self {
        self.payloads.insert(code.to_string(), result);
        self
    }

    pub fn with_catalog(mut self, entries: Vec<CatalogEntry>) -> Self {
        self.catalog = entries;
        self
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls = self.requested.lock().unwrap().clone();
        urls.sort();
        urls
    }
}

impl NavSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(&self, task: &Task) -> Result<Payload, TaskError> {
        self.requested.lock().unwrap().push(task.url());
        let result = self.payloads.get(task.key()).cloned().unwrap_or_else(|| {
            Err(TaskError::Status {
                url: task.url(),
                status: 404,
            })
        });
        // `/latest` serves only the newest record.
        result.map(|mut p| {
            if task.latest_only {
                p.data.truncate(1);
            }
            p
        })
    }

    fn fetch_catalog(&self, _base_url: &str) -> Result<Vec<CatalogEntry>, TaskError> {
        *self.catalog_calls.lock().unwrap() += 1;
        Ok(self.catalog.clone())
    }
}

// ── Enrichment source ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockEnrichment {
    pub failing: HashSet<String>,
}

impl EnrichmentSource for MockEnrichment {
    fn fetch_enrichment(&self, task: &EnrichTask) -> Result<EnrichmentRecord, TaskError> {
        if self.failing.contains(&task.secondary_id) {
            return Err(TaskError::Status {
                url: task.url(),
                status: 500,
            });
        }
        let mut body = serde_json::Map::new();
        body.insert("code".into(), serde_json::json!(format!("K-{}", task.subject_id)));
        Ok(EnrichmentRecord {
            subject_id: task.subject_id.clone(),
            isin: task.secondary_id.clone(),
            category_code: task.category_code.clone(),
            body,
        })
    }
}

// ── Sink ─────────────────────────────────────────────────────────────

/// Keeps every committed chunk in memory; fails chunks containing a
/// subject listed in `failing`.
#[derive(Default)]
pub struct MemorySink {
    pub failing: HashSet<String>,
    pub chunks: Mutex<Vec<Chunk>>,
    pub enrichment: Mutex<Vec<(String, Vec<EnrichmentRecord>)>>,
}

impl MemorySink {
    pub fn failing(subjects: &[&str]) -> Self {
        Self {
            failing: subjects.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Committed record dates per subject, newest first.
    pub fn dates(&self) -> BTreeMap<String, Vec<NaiveDate>> {
        let mut out: BTreeMap<String, Vec<NaiveDate>> = BTreeMap::new();
        for chunk in self.chunks.lock().unwrap().iter() {
            for batch in &chunk.batches {
                out.entry(batch.subject_id.clone())
                    .or_default()
                    .extend(batch.records.iter().map(|r| r.date));
            }
        }
        out
    }
}

impl Sink for MemorySink {
    fn write_navs(
        &self,
        chunk: &Chunk,
        _inserted_at: NaiveDateTime,
    ) -> Result<BTreeMap<SubjectId, NaiveDate>, SinkError> {
        if chunk.subjects().any(|s| self.failing.contains(s)) {
            return Err(SinkError::Io("connection reset by peer".into()));
        }
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(committed_dates(chunk))
    }

    fn write_enrichment(
        &self,
        category: &str,
        _run_date: NaiveDate,
        records: &[EnrichmentRecord],
    ) -> Result<usize, SinkError> {
        if records.iter().any(|r| self.failing.contains(&r.subject_id)) {
            return Err(SinkError::Io("connection reset by peer".into()));
        }
        self.enrichment
            .lock()
            .unwrap()
            .push((category.to_string(), records.to_vec()));
        Ok(records.len())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────

pub fn config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.api.nav_base_url = BASE.into();
    config.api.pacing_ms = 0;
    config.pool.workers = Some(2);
    config.storage.watermark_path = dir.join("watermarks/latest.json");
    config.storage.sink_root = dir.join("lake");
    config
}

pub fn write_watermark(config: &PipelineConfig, json: &str) {
    let path = &config.storage.watermark_path;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, json).unwrap();
}

pub fn orchestrator(
    config: PipelineConfig,
    source: &Arc<MockSource>,
    sink: &Arc<MemorySink>,
    today: NaiveDate,
) -> Orchestrator {
    Orchestrator::new(
        config,
        source.clone(),
        sink.clone(),
        Arc::new(FixedClock(today)),
    )
    .unwrap()
}
