//! Bounded worker pool on a private rayon `ThreadPool`.
//!
//! Every submitted item produces exactly one entry in the result map, keyed
//! by the item's key. Failures (including worker panics) are values, never
//! propagated across the pool boundary, so one bad task cannot take down its
//! siblings.

use navsync_core::data::TaskError;
use navsync_core::{Chunk, EnrichTask, SubjectId, Task};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Outcome of a pool run: one entry per unique key.
pub type ResultMap<T> = BTreeMap<SubjectId, Result<T, TaskError>>;

#[derive(Debug, Error)]
#[error("failed to build worker pool: {0}")]
pub struct PoolError(#[from] rayon::ThreadPoolBuildError);

/// Something the pool can key its results by.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Task {
    fn key(&self) -> &str {
        Task::key(self)
    }
}

impl Keyed for EnrichTask {
    fn key(&self) -> &str {
        &self.subject_id
    }
}

impl Keyed for Chunk {
    fn key(&self) -> &str {
        &self.id.0
    }
}

/// Completion callback. Observability only: it cannot affect results.
pub trait PoolProgress: Send + Sync {
    fn on_complete(&self, key: &str, completed: usize, total: usize);
}

/// Silent progress sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl PoolProgress for NoProgress {
    fn on_complete(&self, _key: &str, _completed: usize, _total: usize) {}
}

/// Logs a line every `every` completions and at the end.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: &'static str,
    every: usize,
}

impl LogProgress {
    pub fn new(label: &'static str, every: usize) -> Self {
        Self {
            label,
            every: every.max(1),
        }
    }
}

impl PoolProgress for LogProgress {
    fn on_complete(&self, _key: &str, completed: usize, total: usize) {
        if completed % self.every == 0 || completed == total {
            info!(stage = self.label, completed, total, "progress");
        }
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("navsync-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over `items`, at most `workers` at a time.
    ///
    /// Items sharing a key are deduplicated first; the first occurrence wins.
    pub fn run<I, T, F>(&self, items: Vec<I>, work: F, progress: &dyn PoolProgress) -> ResultMap<T>
    where
        I: Keyed + Send + Sync,
        T: Send,
        F: Fn(&I) -> Result<T, TaskError> + Sync,
    {
        let items = dedupe(items);
        let total = items.len();
        let completed = AtomicUsize::new(0);

        let results: Vec<(SubjectId, Result<T, TaskError>)> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let key = item.key().to_string();
                    let result = catch_unwind(AssertUnwindSafe(|| work(item)))
                        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(&payload))));
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.on_complete(&key, done, total);
                    (key, result)
                })
                .collect()
        });

        results.into_iter().collect()
    }
}

fn dedupe<I: Keyed>(items: Vec<I>) -> Vec<I> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.key().to_string()) {
            out.push(item);
        } else {
            warn!(key = item.key(), "duplicate task dropped before dispatch");
        }
    }
    out
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
