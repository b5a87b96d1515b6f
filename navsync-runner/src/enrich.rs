//! Enrichment flow: per-ISIN secondary records for every catalog subject.

use crate::config::ConfigError;
use crate::orchestrator::{finish, Orchestrator, RunError, RunOutcome, RunStage};
use crate::pool::{Keyed, LogProgress, ResultMap};
use navsync_core::data::{EnrichmentRecord, EnrichmentSource, TaskError};
use navsync_core::domain::IsinKind;
use navsync_core::{ChunkId, EnrichTask, SubjectId};
use std::str::FromStr;
use tracing::{error, info};

/// Enrichment records committed to the sink together.
struct EnrichmentChunk {
    id: ChunkId,
    records: Vec<EnrichmentRecord>,
}

impl Keyed for EnrichmentChunk {
    fn key(&self) -> &str {
        &self.id.0
    }
}

impl Orchestrator {
    /// Fetch and persist enrichment records for one ISIN category
    /// (`isinGrowth` or `isinDivReinvestment`).
    pub fn run_enrichment(
        &self,
        enrichment: &dyn EnrichmentSource,
        operation: &str,
    ) -> Result<RunOutcome, RunError> {
        let kind = IsinKind::from_str(operation).map_err(|e| RunError::Config(ConfigError::Invalid(e)))?;
        self.guard(|| self.enrich(enrichment, kind))
    }

    fn enrich(&self, enrichment: &dyn EnrichmentSource, kind: IsinKind) -> Result<RunOutcome, RunError> {
        let today = self.today();
        let base = self.config().api.enrichment_base_url.clone();

        self.enter(RunStage::DiscoverNew);
        let catalog = self
            .source()
            .fetch_catalog(&self.config().api.nav_base_url)
            .map_err(RunError::Catalog)?;

        let tasks: Vec<EnrichTask> = catalog
            .iter()
            .filter_map(|entry| {
                entry.isin(kind).map(|isin| EnrichTask {
                    base_url: base.clone(),
                    subject_id: entry.scheme_code.clone(),
                    secondary_id: isin.to_string(),
                    category_code: kind.code().to_string(),
                })
            })
            .collect();
        info!(
            operation = kind.code(),
            catalog = catalog.len(),
            with_isin = tasks.len(),
            "enrichment tasks built"
        );

        let mut outcome = RunOutcome::default();
        if tasks.is_empty() {
            info!("nothing to enrich");
            self.enter(RunStage::Done);
            return Ok(outcome);
        }

        self.enter(RunStage::Dispatch);
        let results = self.pool().run(
            tasks,
            |t: &EnrichTask| enrichment.fetch_enrichment(t),
            &LogProgress::new("enrich", 100),
        );
        outcome.attempted = results.len();

        let mut records = Vec::with_capacity(results.len());
        for (subject, result) in results {
            match result {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    outcome.errors.insert(subject, e);
                }
            }
        }

        self.enter(RunStage::Commit);
        let chunk_size = self.config().delta.chunk_size;
        let chunks: Vec<EnrichmentChunk> = records
            .chunks(chunk_size)
            .map(|group| EnrichmentChunk {
                id: ChunkId::derive(today, group.iter().map(|r| r.subject_id.as_str())),
                records: group.to_vec(),
            })
            .collect();
        let members: Vec<(ChunkId, Vec<SubjectId>)> = chunks
            .iter()
            .map(|c| (c.id.clone(), c.records.iter().map(|r| r.subject_id.clone()).collect()))
            .collect();

        let sink = self.sink();
        let category = kind.code();
        let written = self.pool().run(
            chunks,
            |chunk: &EnrichmentChunk| {
                sink.write_enrichment(category, today, &chunk.records)
                    .map_err(|e| TaskError::Sink {
                        chunk: chunk.id.to_string(),
                        message: e.to_string(),
                    })
            },
            &LogProgress::new("enrich-commit", 10),
        );

        let rows = tally_chunks(members, &written, &mut outcome);
        info!(rows, category, "enrichment written");

        finish(outcome)
    }
}

/// Sum rows written and mark every subject of a failed or unreported chunk
/// as an error.
fn tally_chunks(
    members: Vec<(ChunkId, Vec<SubjectId>)>,
    written: &ResultMap<usize>,
    outcome: &mut RunOutcome,
) -> usize {
    let mut rows = 0;
    for (id, subjects) in members {
        let err = match written.get(&id.0) {
            Some(Ok(n)) => {
                rows += n;
                continue;
            }
            Some(Err(e)) => e.clone(),
            None => TaskError::Sink {
                chunk: id.to_string(),
                message: "no result reported for chunk".into(),
            },
        };
        error!(chunk = %id, error = %err, "enrichment chunk failed");
        for subject in subjects {
            outcome.errors.insert(subject, err.clone());
        }
    }
    rows
}
