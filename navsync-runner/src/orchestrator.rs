//! Run orchestration.
//!
//! Daily run:
//! `LoadWatermark → (DiscoverNew) → ComputeDelta → Dispatch → Reconcile →
//! Commit → PersistWatermark → Done`, or `Failed` on an unrecoverable error.
//!
//! Stages run one after another; only Dispatch and Commit fan out to the
//! worker pool. The watermark file is read at the start and merge-written
//! once at the end, from this thread only.

use crate::commit::{merge_max, BatchCommitter, CommitOutcome};
use crate::config::{ConfigError, PipelineConfig};
use crate::pool::{LogProgress, PoolError, WorkerPool};
use crate::reconcile::{Reconciled, Reconciler};
use chrono::{NaiveDate, Utc};
use navsync_core::data::{
    NavSource, Sink, TaskError, Watermark, WatermarkError, WatermarkStore,
};
use navsync_core::dates::day_gap;
use navsync_core::{Clock, SubjectId, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    LoadWatermark,
    DiscoverNew,
    ComputeDelta,
    Dispatch,
    Reconcile,
    Commit,
    PersistWatermark,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::LoadWatermark => "LOAD_WATERMARK",
            RunStage::DiscoverNew => "DISCOVER_NEW",
            RunStage::ComputeDelta => "COMPUTE_DELTA",
            RunStage::Dispatch => "DISPATCH",
            RunStage::Reconcile => "RECONCILE",
            RunStage::Commit => "COMMIT",
            RunStage::PersistWatermark => "PERSIST_WATERMARK",
            RunStage::Done => "DONE",
            RunStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watermark(#[from] WatermarkError),

    #[error("catalog pull failed: {0}")]
    Catalog(TaskError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("{failed} subject(s) failed")]
    Failed {
        failed: usize,
        outcome: Box<RunOutcome>,
    },
}

/// Everything a run did, success or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub errors: BTreeMap<SubjectId, TaskError>,
    /// Newest date written per subject (the watermark delta).
    pub committed: BTreeMap<SubjectId, NaiveDate>,
    pub attempted: usize,
    pub discovered: usize,
    pub up_to_date: usize,
    pub skipped_stale: usize,
    pub rejected_by_window: usize,
    pub invalid_records: usize,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn absorb_reconcile(&mut self, reconciled: &Reconciled) {
        self.up_to_date += reconciled.stats.up_to_date;
        self.rejected_by_window += reconciled.stats.rejected_by_window;
        self.invalid_records += reconciled.stats.invalid_records;
    }

    fn absorb_commit(&mut self, commit: CommitOutcome) {
        merge_max(&mut self.committed, commit.delta);
        self.errors.extend(commit.errors);
    }
}

/// Which watermark subjects to fetch today.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaPlan {
    pub tasks: Vec<Task>,
    /// Older than the stale threshold; left alone.
    pub skipped_stale: usize,
    /// Watermark already at (or past) today.
    pub current: usize,
    /// Watermark value could not be parsed.
    pub invalid: usize,
}

/// Injected dependencies of a run.
pub struct Orchestrator {
    config: PipelineConfig,
    source: Arc<dyn NavSource>,
    sink: Arc<dyn Sink>,
    clock: Arc<dyn Clock>,
    store: WatermarkStore,
    pool: WorkerPool,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn NavSource>,
        sink: Arc<dyn Sink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let pool = WorkerPool::new(config.pool.worker_count())?;
        let store = WatermarkStore::new(&config.storage.watermark_path);
        info!(
            source = source.name(),
            workers = pool.workers(),
            watermark = %store.path().display(),
            "orchestrator ready"
        );
        Ok(Self {
            config,
            source,
            sink,
            clock,
            store,
            pool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &WatermarkStore {
        &self.store
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn sink(&self) -> &dyn Sink {
        self.sink.as_ref()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub(crate) fn source(&self) -> &dyn NavSource {
        self.source.as_ref()
    }

    pub(crate) fn enter(&self, stage: RunStage) {
        info!(stage = %stage, "stage");
    }

    /// Incremental daily run. With `search_new`, the run backfills catalog
    /// subjects missing from the watermark instead of computing the delta.
    pub fn run_daily(&self, search_new: bool) -> Result<RunOutcome, RunError> {
        self.guard(|| self.daily(search_new))
    }

    fn daily(&self, search_new: bool) -> Result<RunOutcome, RunError> {
        let today = self.today();
        let mut outcome = RunOutcome::default();

        self.enter(RunStage::LoadWatermark);
        let watermark = self.store.load()?;
        info!(subjects = watermark.len(), "watermark loaded");

        let tasks = if search_new {
            self.enter(RunStage::DiscoverNew);
            let fresh = self.discover(&watermark)?;
            outcome.discovered = fresh.len();
            fresh
        } else {
            self.enter(RunStage::ComputeDelta);
            let plan = self.plan_delta(&watermark, today);
            outcome.skipped_stale = plan.skipped_stale;
            plan.tasks
        };

        self.execute(tasks, &watermark, today, outcome)
    }

    /// Tasks for watermark subjects that are behind but not stale.
    pub fn plan_delta(&self, watermark: &Watermark, today: NaiveDate) -> DeltaPlan {
        let threshold = self.config.delta.stale_threshold_days;
        let base = &self.config.api.nav_base_url;
        let mut plan = DeltaPlan::default();

        let (entries, invalid) = watermark.parsed();
        for (subject, raw) in &invalid {
            warn!(subject = %subject, value = %raw, "unparseable watermark entry skipped");
        }
        plan.invalid = invalid.len();

        for (subject, date) in entries {
            let gap = day_gap(today, date);
            if gap <= 0 {
                plan.current += 1;
            } else if gap > threshold {
                info!(subject = %subject, day_gap = gap, "stale subject skipped");
                plan.skipped_stale += 1;
            } else {
                plan.tasks.push(Task::new(base.as_str(), subject, gap == 1));
            }
        }

        info!(
            due = plan.tasks.len(),
            current = plan.current,
            stale = plan.skipped_stale,
            invalid = plan.invalid,
            "delta computed"
        );
        plan
    }

    /// Full-series tasks for catalog subjects missing from the watermark.
    pub fn discover(&self, watermark: &Watermark) -> Result<Vec<Task>, RunError> {
        let base = &self.config.api.nav_base_url;
        let catalog = self.source.fetch_catalog(base).map_err(RunError::Catalog)?;

        let tasks: Vec<Task> = catalog
            .iter()
            .filter(|entry| !entry.scheme_code.is_empty() && !watermark.contains(&entry.scheme_code))
            .map(|entry| Task::new(base.as_str(), entry.scheme_code.clone(), false))
            .collect();

        info!(catalog = catalog.len(), new = tasks.len(), "discovery");
        Ok(tasks)
    }

    /// Full-series backfill of `subjects` (every catalog subject when empty).
    /// Records are not filtered by the watermark; the watermark is merged
    /// afterwards and never moves backwards.
    pub fn run_historical(&self, subjects: Vec<SubjectId>) -> Result<RunOutcome, RunError> {
        self.guard(|| {
            let today = self.today();
            let base = self.config.api.nav_base_url.clone();

            let subjects = if subjects.is_empty() {
                self.enter(RunStage::DiscoverNew);
                self.source
                    .fetch_catalog(&base)
                    .map_err(RunError::Catalog)?
                    .into_iter()
                    .map(|e| e.scheme_code)
                    .filter(|code| !code.is_empty())
                    .collect()
            } else {
                subjects
            };

            let tasks = subjects
                .into_iter()
                .map(|s| Task::new(base.as_str(), s, false))
                .collect();
            self.execute(tasks, &Watermark::new(), today, RunOutcome::default())
        })
    }

    /// Fetch `/latest` for every catalog subject and write the dates inside
    /// the acceptance window into the watermark. Nothing goes to the sink.
    ///
    /// Fetch failures are logged and reported in the outcome but do not fail
    /// the run: the catalog routinely lists retired subjects.
    pub fn seed_watermark(&self) -> Result<RunOutcome, RunError> {
        self.guard(|| {
            let today = self.today();
            let base = self.config.api.nav_base_url.clone();
            let window = self.config.acceptance;

            self.enter(RunStage::DiscoverNew);
            let catalog = self.source.fetch_catalog(&base).map_err(RunError::Catalog)?;
            let tasks: Vec<Task> = catalog
                .into_iter()
                .filter(|e| !e.scheme_code.is_empty())
                .map(|e| Task::new(base.as_str(), e.scheme_code, true))
                .collect();

            self.enter(RunStage::Dispatch);
            let source = self.source();
            let results = self
                .pool
                .run(tasks, |t: &Task| source.fetch(t), &LogProgress::new("seed", 500));
            let mut outcome = RunOutcome {
                attempted: results.len(),
                ..RunOutcome::default()
            };

            for (subject, result) in results {
                match result {
                    Ok(payload) => match payload.first_date() {
                        Some(date) if window.accepts(today, date) => {
                            outcome.committed.insert(subject, date);
                        }
                        Some(_) => outcome.rejected_by_window += 1,
                        None => outcome.up_to_date += 1,
                    },
                    Err(e) => {
                        warn!(subject = %subject, error = %e, "seed fetch failed");
                        outcome.errors.insert(subject, e);
                    }
                }
            }

            self.enter(RunStage::PersistWatermark);
            let merged = self.store.merge_update(&outcome.committed)?;
            info!(
                seeded = outcome.committed.len(),
                total = merged.len(),
                failed = outcome.errors.len(),
                "watermark seeded"
            );
            self.enter(RunStage::Done);
            Ok(outcome)
        })
    }

    /// Dispatch → Reconcile → Commit → PersistWatermark for `tasks`.
    fn execute(
        &self,
        tasks: Vec<Task>,
        watermark: &Watermark,
        today: NaiveDate,
        mut outcome: RunOutcome,
    ) -> Result<RunOutcome, RunError> {
        if tasks.is_empty() {
            info!("nothing to fetch");
            self.enter(RunStage::Done);
            return Ok(outcome);
        }

        self.enter(RunStage::Dispatch);
        let source = self.source();
        let results = self
            .pool
            .run(tasks, |t: &Task| source.fetch(t), &LogProgress::new("fetch", 100));
        outcome.attempted = results.len();

        self.enter(RunStage::Reconcile);
        let reconciler = Reconciler::new(watermark, self.config.acceptance, today);
        let reconciled = reconciler.reconcile(results);
        outcome.absorb_reconcile(&reconciled);
        outcome.errors.extend(reconciled.errors);

        self.enter(RunStage::Commit);
        let committer =
            BatchCommitter::new(self.sink.as_ref(), &self.pool, self.config.delta.chunk_size);
        let commit = committer.commit(reconciled.batches, today, Utc::now().naive_utc());
        outcome.absorb_commit(commit);

        if !outcome.committed.is_empty() {
            self.enter(RunStage::PersistWatermark);
            self.store.merge_update(&outcome.committed)?;
        }

        finish(outcome)
    }

    /// Log the terminal stage of a flow.
    pub(crate) fn guard<F>(&self, flow: F) -> Result<RunOutcome, RunError>
    where
        F: FnOnce() -> Result<RunOutcome, RunError>,
    {
        let result = flow();
        if let Err(e) = &result {
            error!(stage = %RunStage::Failed, error = %e, "run failed");
        }
        result
    }
}

/// Log every failed subject and turn remaining errors into `RunError::Failed`.
pub(crate) fn finish(outcome: RunOutcome) -> Result<RunOutcome, RunError> {
    for (subject, e) in &outcome.errors {
        error!(subject = %subject, kind = ?e.kind(), error = %e, "subject failed");
    }
    info!(
        attempted = outcome.attempted,
        committed = outcome.committed.len(),
        failed = outcome.errors.len(),
        up_to_date = outcome.up_to_date,
        stale = outcome.skipped_stale,
        rejected_by_window = outcome.rejected_by_window,
        "run summary"
    );

    if outcome.errors.is_empty() {
        info!(stage = %RunStage::Done, "stage");
        Ok(outcome)
    } else {
        Err(RunError::Failed {
            failed: outcome.errors.len(),
            outcome: Box::new(outcome),
        })
    }
}
