//! navsync CLI: incremental NAV ingestion.
//!
//! Commands:
//! - `daily`: fetch records newer than the watermark (optionally discover new subjects)
//! - `historical`: full-series backfill for given subjects or the whole catalog
//! - `seed`: initialise the watermark from each subject's latest record
//! - `enrich`: fetch per-ISIN enrichment records for one ISIN category
//!
//! Logging goes through `tracing`; set `RUST_LOG` to adjust (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use navsync_core::data::{EnrichmentClient, MfApiClient, ParquetSink};
use navsync_core::SystemClock;
use navsync_runner::{Orchestrator, PipelineConfig, RunError, RunOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "navsync", about = "navsync: incremental NAV ingestion engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch NAV records newer than the watermark and commit them.
    Daily {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Backfill catalog subjects missing from the watermark instead of the delta.
        #[arg(long, default_value_t = false)]
        search: bool,
    },
    /// Full-series backfill.
    Historical {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Subject ids to backfill. Defaults to every catalog subject.
        subjects: Vec<String>,
    },
    /// Seed the watermark from each catalog subject's latest record.
    Seed {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Fetch enrichment records for one ISIN category.
    Enrich {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// ISIN category: isinGrowth or isinDivReinvestment.
        operation: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Daily { config, search } => build(&config).map(|orch| orch.run_daily(search)),
        Commands::Historical { config, subjects } => {
            build(&config).map(|orch| orch.run_historical(subjects))
        }
        Commands::Seed { config } => build(&config).map(|orch| orch.seed_watermark()),
        Commands::Enrich { config, operation } => build(&config).and_then(|orch| {
            let client = EnrichmentClient::new(orch.config().api.http_settings())
                .context("building enrichment HTTP client")?;
            Ok(orch.run_enrichment(&client, &operation))
        }),
    }?;

    report(result)
}

/// Load config and wire the HTTP source, Parquet sink, and system clock.
fn build(config_path: &Path) -> Result<Orchestrator> {
    let config = PipelineConfig::load(config_path)?;
    let source = MfApiClient::new(config.api.http_settings()).context("building HTTP client")?;
    let sink = ParquetSink::new(&config.storage.sink_root);
    info!(config = %config_path.display(), sink = %sink.root().display(), "starting");

    Ok(Orchestrator::new(
        config,
        Arc::new(source),
        Arc::new(sink),
        Arc::new(SystemClock),
    )?)
}

fn report(result: Result<RunOutcome, RunError>) -> Result<()> {
    match result {
        Ok(outcome) => {
            info!(
                attempted = outcome.attempted,
                committed = outcome.committed.len(),
                failed = outcome.errors.len(),
                "run finished"
            );
            Ok(())
        }
        Err(RunError::Failed { failed, outcome }) => {
            error!(
                failed,
                committed = outcome.committed.len(),
                attempted = outcome.attempted,
                "run finished with failures"
            );
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
