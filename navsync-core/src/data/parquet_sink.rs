//! Parquet sink with date-partitioned layout.
//!
//! Layout under `{root}`:
//! - `daily_extracts/{Y}/{MM}/{DD}/navs_{chunk}.parquet`
//! - `metadata/{Y}/{MM}/{DD}/schemes_{chunk}.parquet`
//! - `enrichment/{Y}/{MM}/{DD}/{category}_{chunk}.parquet`
//!
//! Every file is written to `.tmp` and renamed into place. File names carry
//! the chunk id, so re-committing the same chunk on the same day replaces
//! its own output.

use super::provider::EnrichmentRecord;
use super::sink::{committed_dates, nav_rows, scheme_rows, Sink, SinkError};
use crate::domain::{Chunk, ChunkId, SchemeMeta, SubjectId};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ParquetSink {
    root: PathBuf,
}

impl ParquetSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{area}/{Y}/{MM}/{DD}`
    fn day_dir(&self, area: &str, run_date: NaiveDate) -> PathBuf {
        self.root
            .join(area)
            .join(format!("{}", run_date.year()))
            .join(format!("{:02}", run_date.month()))
            .join(format!("{:02}", run_date.day()))
    }

    pub fn nav_path(&self, run_date: NaiveDate, chunk: &ChunkId) -> PathBuf {
        self.day_dir("daily_extracts", run_date)
            .join(format!("navs_{chunk}.parquet"))
    }

    pub fn meta_path(&self, run_date: NaiveDate, chunk: &ChunkId) -> PathBuf {
        self.day_dir("metadata", run_date)
            .join(format!("schemes_{chunk}.parquet"))
    }

    pub fn enrichment_path(&self, category: &str, run_date: NaiveDate, chunk: &ChunkId) -> PathBuf {
        self.day_dir("enrichment", run_date)
            .join(format!("{category}_{chunk}.parquet"))
    }
}

impl Sink for ParquetSink {
    fn write_navs(
        &self,
        chunk: &Chunk,
        inserted_at: NaiveDateTime,
    ) -> Result<BTreeMap<SubjectId, NaiveDate>, SinkError> {
        if chunk.record_count() == 0 {
            return Ok(BTreeMap::new());
        }

        let navs = navs_to_dataframe(chunk, inserted_at)?;
        let schemes = schemes_to_dataframe(chunk, inserted_at)?;

        let nav_path = self.nav_path(chunk.run_date, &chunk.id);
        write_parquet_atomic(&navs, &nav_path)?;
        write_parquet_atomic(&schemes, &self.meta_path(chunk.run_date, &chunk.id))?;

        debug!(
            chunk = %chunk.id,
            rows = navs.height(),
            path = %nav_path.display(),
            "wrote NAV chunk"
        );
        Ok(committed_dates(chunk))
    }

    fn write_enrichment(
        &self,
        category: &str,
        run_date: NaiveDate,
        records: &[EnrichmentRecord],
    ) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }

        let id = ChunkId::derive(run_date, records.iter().map(|r| r.subject_id.as_str()));
        let df = enrichment_to_dataframe(records)?;
        let path = self.enrichment_path(category, run_date, &id);
        write_parquet_atomic(&df, &path)?;

        debug!(chunk = %id, rows = df.height(), category, "wrote enrichment chunk");
        Ok(df.height())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn polars_err(context: &'static str) -> impl Fn(PolarsError) -> SinkError {
    move |e| SinkError::Parquet(format!("{context}: {e}"))
}

fn timestamp_column(inserted_at: NaiveDateTime, n: usize) -> Result<Column, SinkError> {
    let millis = inserted_at.and_utc().timestamp_millis();
    Column::new("insert_timestamp".into(), vec![millis; n])
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(polars_err("timestamp cast"))
}

fn navs_to_dataframe(chunk: &Chunk, inserted_at: NaiveDateTime) -> Result<DataFrame, SinkError> {
    let rows = nav_rows(chunk, inserted_at);
    let epoch = NaiveDate::default();

    let subjects: Vec<String> = rows.iter().map(|r| r.subject_id.clone()).collect();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    // Kept as exact decimal text; no float rounding on the way to disk.
    let values: Vec<Option<String>> = rows
        .iter()
        .map(|r| r.value.map(|v| v.to_string()))
        .collect();

    DataFrame::new(vec![
        timestamp_column(inserted_at, rows.len())?,
        Column::new("scheme_code".into(), subjects),
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(polars_err("date cast"))?,
        Column::new("nav".into(), values),
    ])
    .map_err(polars_err("dataframe creation"))
}

fn schemes_to_dataframe(
    chunk: &Chunk,
    inserted_at: NaiveDateTime,
) -> Result<DataFrame, SinkError> {
    let rows = scheme_rows(chunk);
    let column = |name: &str, f: fn(&SchemeMeta) -> Option<String>| {
        let values: Vec<Option<String>> = rows.iter().map(|(_, meta, _)| f(meta)).collect();
        Column::new(name.into(), values)
    };

    DataFrame::new(vec![
        timestamp_column(inserted_at, rows.len())?,
        Column::new(
            "scheme_code".into(),
            rows.iter().map(|(id, _, _)| id.clone()).collect::<Vec<String>>(),
        ),
        column("fund_house", |m| m.fund_house.clone()),
        column("scheme_type", |m| m.scheme_type.clone()),
        column("scheme_category", |m| m.scheme_category.clone()),
        column("scheme_name", |m| m.scheme_name.clone()),
        column("isin_growth", |m| m.isin_growth.clone()),
        column("isin_div_reinvestment", |m| m.isin_div_reinvestment.clone()),
        Column::new(
            "status".into(),
            rows.iter()
                .map(|(_, _, status)| status.clone())
                .collect::<Vec<Option<String>>>(),
        ),
    ])
    .map_err(polars_err("dataframe creation"))
}

fn enrichment_to_dataframe(records: &[EnrichmentRecord]) -> Result<DataFrame, SinkError> {
    let bodies = records
        .iter()
        .map(|r| serde_json::to_string(&r.body))
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| SinkError::Parquet(format!("body serialization: {e}")))?;

    DataFrame::new(vec![
        Column::new(
            "scheme_code".into(),
            records.iter().map(|r| r.subject_id.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            "isin".into(),
            records.iter().map(|r| r.isin.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            "type_code".into(),
            records.iter().map(|r| r.category_code.clone()).collect::<Vec<String>>(),
        ),
        Column::new("body".into(), bodies),
    ])
    .map_err(polars_err("dataframe creation"))
}

/// Write to `{path}.tmp`, then rename into place.
fn write_parquet_atomic(df: &DataFrame, path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SinkError::Io(format!("create {}: {e}", parent.display())))?;
    }

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| SinkError::Io(format!("create {}: {e}", tmp_path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            SinkError::Parquet(format!("write parquet: {e}"))
        })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SinkError::Io(format!("atomic rename failed: {e}"))
    })
}
