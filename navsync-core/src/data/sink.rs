//! Sink capability: where committed NAV rows and enrichment records land.

use super::provider::EnrichmentRecord;
use crate::domain::{Chunk, SchemeMeta, SubjectId};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),
}

/// Persistence capability. Implementations must be safe to call from
/// several pool workers at once, each with a different chunk.
pub trait Sink: Send + Sync {
    /// Persist every record of the chunk and return, per subject, the newest
    /// date written. All-or-nothing per chunk.
    fn write_navs(
        &self,
        chunk: &Chunk,
        inserted_at: NaiveDateTime,
    ) -> Result<BTreeMap<SubjectId, NaiveDate>, SinkError>;

    /// Persist enrichment records for one category; returns the row count.
    fn write_enrichment(
        &self,
        category: &str,
        run_date: NaiveDate,
        records: &[EnrichmentRecord],
    ) -> Result<usize, SinkError>;
}

/// One persisted NAV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavRow {
    pub insert_timestamp: NaiveDateTime,
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

/// Flatten a chunk into rows, preserving batch and record order.
pub fn nav_rows(chunk: &Chunk, inserted_at: NaiveDateTime) -> Vec<NavRow> {
    chunk
        .batches
        .iter()
        .flat_map(|batch| {
            batch.records.iter().map(move |rec| NavRow {
                insert_timestamp: inserted_at,
                subject_id: batch.subject_id.clone(),
                date: rec.date,
                value: rec.value,
            })
        })
        .collect()
}

/// One scheme-metadata row per batch.
pub fn scheme_rows(chunk: &Chunk) -> Vec<(SubjectId, SchemeMeta, Option<String>)> {
    chunk
        .batches
        .iter()
        .map(|b| (b.subject_id.clone(), b.meta.clone(), b.status.clone()))
        .collect()
}

/// Newest date per subject in a chunk.
pub fn committed_dates(chunk: &Chunk) -> BTreeMap<SubjectId, NaiveDate> {
    let mut out: BTreeMap<SubjectId, NaiveDate> = BTreeMap::new();
    for batch in &chunk.batches {
        if let Some(newest) = batch.newest() {
            out.entry(batch.subject_id.clone())
                .and_modify(|d| *d = (*d).max(newest))
                .or_insert(newest);
        }
    }
    out
}
