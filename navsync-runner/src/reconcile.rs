//! Turns raw fetch results into committable batches.
//!
//! Per subject: errors are set aside, records are parsed one by one (bad
//! ones skipped), the acceptance window is applied, and only records newer
//! than the watermark survive. A subject with nothing new is dropped quietly.

use crate::config::AcceptanceWindow;
use crate::pool::ResultMap;
use chrono::NaiveDate;
use navsync_core::data::{TaskError, Watermark};
use navsync_core::{Batch, Payload, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What reconciliation decided for one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Commit(Batch),
    /// Nothing newer than the watermark.
    UpToDate,
    /// First record falls outside the acceptance window.
    OutsideWindow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub batches: usize,
    pub up_to_date: usize,
    pub rejected_by_window: usize,
    /// Individual records skipped for a bad date or value.
    pub invalid_records: usize,
}

#[derive(Debug, Default)]
pub struct Reconciled {
    pub batches: Vec<Batch>,
    pub errors: BTreeMap<SubjectId, TaskError>,
    pub stats: ReconcileStats,
}

pub struct Reconciler<'a> {
    watermark: &'a Watermark,
    window: AcceptanceWindow,
    today: NaiveDate,
}

impl<'a> Reconciler<'a> {
    pub fn new(watermark: &'a Watermark, window: AcceptanceWindow, today: NaiveDate) -> Self {
        Self {
            watermark,
            window,
            today,
        }
    }

    pub fn reconcile(&self, results: ResultMap<Payload>) -> Reconciled {
        let mut out = Reconciled::default();

        for (subject, result) in results {
            let payload = match result {
                Ok(p) => p,
                Err(e) => {
                    out.errors.insert(subject, e);
                    continue;
                }
            };

            let (decision, skipped) = self.reconcile_one(&subject, &payload);
            out.stats.invalid_records += skipped;
            match decision {
                Reconciliation::Commit(batch) => {
                    out.stats.batches += 1;
                    out.batches.push(batch);
                }
                Reconciliation::UpToDate => {
                    debug!(subject = %subject, "no new records");
                    out.stats.up_to_date += 1;
                }
                Reconciliation::OutsideWindow => {
                    debug!(subject = %subject, "first record outside acceptance window");
                    out.stats.rejected_by_window += 1;
                }
            }
        }

        info!(
            batches = out.stats.batches,
            errors = out.errors.len(),
            up_to_date = out.stats.up_to_date,
            rejected_by_window = out.stats.rejected_by_window,
            invalid_records = out.stats.invalid_records,
            "reconciled"
        );
        out
    }

    /// Decide one subject. Also returns how many records were skipped as invalid.
    pub fn reconcile_one(&self, subject: &str, payload: &Payload) -> (Reconciliation, usize) {
        let (mut records, rejected) = payload.parse_records();
        for err in &rejected {
            debug!(subject, error = %err, "skipping record");
        }

        let Some(first) = records.first() else {
            return (Reconciliation::UpToDate, rejected.len());
        };
        if !self.window.accepts(self.today, first.date) {
            return (Reconciliation::OutsideWindow, rejected.len());
        }

        if let Some(since) = self.watermark.date(subject) {
            records.retain(|r| r.date > since);
        }
        if records.is_empty() {
            return (Reconciliation::UpToDate, rejected.len());
        }
        records.sort_by(|a, b| b.date.cmp(&a.date));

        let batch = Batch {
            subject_id: subject.to_string(),
            meta: payload.meta.clone(),
            status: payload.status.clone(),
            records,
        };
        (Reconciliation::Commit(batch), rejected.len())
    }
}
