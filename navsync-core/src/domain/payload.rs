//! Upstream NAV payloads and the batches derived from them.

use super::catalog::opt_code_as_string;
use super::{ChunkId, SubjectId};
use crate::dates::{self, DateError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Scheme metadata block of a NAV payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeMeta {
    #[serde(default, deserialize_with = "opt_code_as_string")]
    pub scheme_code: Option<String>,
    #[serde(default)]
    pub fund_house: Option<String>,
    #[serde(default)]
    pub scheme_type: Option<String>,
    #[serde(default)]
    pub scheme_category: Option<String>,
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub isin_growth: Option<String>,
    #[serde(default)]
    pub isin_div_reinvestment: Option<String>,
}

/// A dated record exactly as the API returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub date: String,
    #[serde(default, alias = "nav")]
    pub value: Option<serde_json::Value>,
}

/// Decoded body of `GET {base}/{id}` and `GET {base}/{id}/latest`.
///
/// `data` is ordered newest first, as served upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub meta: SchemeMeta,
    #[serde(default)]
    pub data: Vec<RawRecord>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A validated record. A missing value is kept; an unparseable one is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavRecord {
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

/// Why a single raw record was skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Date(#[from] DateError),

    #[error("invalid value '{value}' on {date}")]
    Value { date: NaiveDate, value: String },
}

impl RawRecord {
    pub fn parse(&self) -> Result<NavRecord, RecordError> {
        let date = dates::parse_date(&self.date)?;
        let value = match &self.value {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
            Some(serde_json::Value::String(s)) => {
                Some(Decimal::from_str(s.trim()).map_err(|_| RecordError::Value {
                    date,
                    value: s.clone(),
                })?)
            }
            Some(serde_json::Value::Number(n)) => {
                let text = n.to_string();
                Some(
                    Decimal::from_str(&text)
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map_err(|_| RecordError::Value { date, value: text })?,
                )
            }
            Some(other) => {
                return Err(RecordError::Value {
                    date,
                    value: other.to_string(),
                })
            }
        };
        Ok(NavRecord { date, value })
    }
}

impl Payload {
    /// Parse every record, keeping the good ones in upstream order.
    pub fn parse_records(&self) -> (Vec<NavRecord>, Vec<RecordError>) {
        let mut records = Vec::with_capacity(self.data.len());
        let mut rejected = Vec::new();
        for raw in &self.data {
            match raw.parse() {
                Ok(rec) => records.push(rec),
                Err(e) => rejected.push(e),
            }
        }
        (records, rejected)
    }

    /// Date of the first record as served, if it parses.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.data
            .first()
            .and_then(|r| dates::parse_date(&r.date).ok())
    }
}

/// Records of one subject that are ready to be committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub subject_id: SubjectId,
    pub meta: SchemeMeta,
    pub status: Option<String>,
    /// Newest first. Never empty.
    pub records: Vec<NavRecord>,
}

impl Batch {
    /// Newest record date in the batch.
    pub fn newest(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }
}

/// A group of batches committed to the sink in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub run_date: NaiveDate,
    pub batches: Vec<Batch>,
}

impl Chunk {
    pub fn new(run_date: NaiveDate, batches: Vec<Batch>) -> Self {
        let id = ChunkId::derive(run_date, batches.iter().map(|b| b.subject_id.as_str()));
        Self {
            id,
            run_date,
            batches,
        }
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().map(|b| b.subject_id.as_str())
    }

    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const SAMPLE: &str = r#"{
        "meta": {
            "fund_house": "Alpha Mutual Fund",
            "scheme_type": "Open Ended Schemes",
            "scheme_category": "Equity Scheme - Large Cap Fund",
            "scheme_code": 100,
            "scheme_name": "Alpha Bluechip Fund - Growth",
            "isin_growth": "INF209K01YY4",
            "isin_div_reinvestment": null
        },
        "data": [
            {"date": "26-07-2024", "nav": "101.23450"},
            {"date": "25-07-2024", "nav": "100.10000"},
            {"date": "bad-date", "nav": "99.0"},
            {"date": "24-07-2024", "nav": "n/a"},
            {"date": "23-07-2024", "nav": null}
        ],
        "status": "SUCCESS"
    }"#;

    #[test]
    fn decodes_upstream_shape() {
        let payload: Payload = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(payload.meta.scheme_code.as_deref(), Some("100"));
        assert_eq!(payload.status.as_deref(), Some("SUCCESS"));
        assert_eq!(payload.data.len(), 5);
        assert_eq!(payload.first_date(), Some(d(2024, 7, 26)));
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let payload: Payload = serde_json::from_str(SAMPLE).unwrap();
        let (records, rejected) = payload.parse_records();

        assert_eq!(records.len(), 3);
        assert_eq!(rejected.len(), 2);
        assert_eq!(records[0].value, Some(dec("101.23450")));
        assert_eq!(records[2].date, d(2024, 7, 23));
        assert_eq!(records[2].value, None);
        assert!(matches!(rejected[1], RecordError::Value { .. }));
    }

    #[test]
    fn numeric_values_are_accepted() {
        let raw = RawRecord {
            date: "01-01-2025".into(),
            value: Some(serde_json::json!(12.5)),
        };
        assert_eq!(raw.parse().unwrap().value, Some(dec("12.5")));
    }

    #[test]
    fn chunk_counts_records() {
        let batch = Batch {
            subject_id: "100".into(),
            meta: SchemeMeta::default(),
            status: None,
            records: vec![
                NavRecord { date: d(2024, 7, 26), value: None },
                NavRecord { date: d(2024, 7, 25), value: None },
            ],
        };
        assert_eq!(batch.newest(), Some(d(2024, 7, 26)));

        let chunk = Chunk::new(d(2024, 7, 27), vec![batch]);
        assert_eq!(chunk.record_count(), 2);
        assert_eq!(chunk.subjects().collect::<Vec<_>>(), vec!["100"]);
    }
}
