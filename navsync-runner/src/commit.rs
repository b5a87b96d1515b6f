//! Batch committer: chunk, write through the pool, fold into one delta.

use crate::pool::{LogProgress, WorkerPool};
use chrono::{NaiveDate, NaiveDateTime};
use navsync_core::data::{Sink, TaskError};
use navsync_core::{Batch, Chunk, SubjectId};
use std::collections::BTreeMap;
use tracing::{error, info};

/// Result of committing every batch of a run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommitOutcome {
    /// Newest committed date per subject, for the watermark.
    pub delta: BTreeMap<SubjectId, NaiveDate>,
    /// Subjects whose chunk failed; excluded from `delta`.
    pub errors: BTreeMap<SubjectId, TaskError>,
    pub chunks_written: usize,
    pub chunks_failed: usize,
}

pub struct BatchCommitter<'a> {
    sink: &'a dyn Sink,
    pool: &'a WorkerPool,
    chunk_size: usize,
}

impl<'a> BatchCommitter<'a> {
    pub fn new(sink: &'a dyn Sink, pool: &'a WorkerPool, chunk_size: usize) -> Self {
        Self {
            sink,
            pool,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Split `batches` into chunks of `chunk_size`.
    pub fn chunk(&self, run_date: NaiveDate, batches: Vec<Batch>) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(batches.len().div_ceil(self.chunk_size));
        let mut iter = batches.into_iter().peekable();
        while iter.peek().is_some() {
            let group: Vec<Batch> = iter.by_ref().take(self.chunk_size).collect();
            chunks.push(Chunk::new(run_date, group));
        }
        chunks
    }

    pub fn commit(
        &self,
        batches: Vec<Batch>,
        run_date: NaiveDate,
        inserted_at: NaiveDateTime,
    ) -> CommitOutcome {
        let chunks = self.chunk(run_date, batches);
        if chunks.is_empty() {
            return CommitOutcome::default();
        }

        let members: BTreeMap<String, Vec<SubjectId>> = chunks
            .iter()
            .map(|c| (c.id.0.clone(), c.subjects().map(str::to_string).collect()))
            .collect();

        info!(chunks = chunks.len(), "committing");
        let sink = self.sink;
        let results = self.pool.run(
            chunks,
            |chunk: &Chunk| {
                sink.write_navs(chunk, inserted_at)
                    .map_err(|e| TaskError::Sink {
                        chunk: chunk.id.to_string(),
                        message: e.to_string(),
                    })
            },
            &LogProgress::new("commit", 10),
        );

        let mut outcome = CommitOutcome::default();
        for (chunk_id, result) in results {
            match result {
                Ok(dates) => {
                    outcome.chunks_written += 1;
                    merge_max(&mut outcome.delta, dates);
                }
                Err(e) => {
                    outcome.chunks_failed += 1;
                    error!(chunk = %chunk_id, error = %e, "chunk commit failed");
                    for subject in members.get(&chunk_id).into_iter().flatten() {
                        outcome.errors.insert(subject.clone(), e.clone());
                    }
                }
            }
        }
        for subject in outcome.errors.keys() {
            outcome.delta.remove(subject);
        }
        outcome
    }
}

/// Fold `dates` into `into`, keeping the later date per subject.
pub fn merge_max(into: &mut BTreeMap<SubjectId, NaiveDate>, dates: BTreeMap<SubjectId, NaiveDate>) {
    for (subject, date) in dates {
        into.entry(subject)
            .and_modify(|d| *d = (*d).max(date))
            .or_insert(date);
    }
}
