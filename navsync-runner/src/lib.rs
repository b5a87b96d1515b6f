//! navsync runner: worker pool, reconciliation, commits, and run flows.
//!
//! This crate builds on `navsync-core` to provide:
//! - TOML pipeline configuration with config-path resolution
//! - A bounded worker pool on a private rayon thread pool
//! - The result reconciler (record validation, acceptance window, watermark filter)
//! - The batch committer (chunking, sink writes, delta merge)
//! - The orchestrator: daily, historical, seed, and enrichment flows

pub mod commit;
pub mod config;
pub mod enrich;
pub mod orchestrator;
pub mod pool;
pub mod reconcile;

pub use commit::{BatchCommitter, CommitOutcome};
pub use config::{
    resolve_config_path, AcceptanceWindow, ApiConfig, ConfigError, DeltaConfig, PipelineConfig,
    PoolConfig, StorageConfig,
};
pub use orchestrator::{DeltaPlan, Orchestrator, RunError, RunOutcome, RunStage};
pub use pool::{Keyed, LogProgress, NoProgress, PoolError, PoolProgress, ResultMap, WorkerPool};
pub use reconcile::{ReconcileStats, Reconciled, Reconciler, Reconciliation};
