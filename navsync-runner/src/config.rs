//! Pipeline configuration, loaded from TOML.
//!
//! ```toml
//! [api]
//! nav_base_url = "https://api.mfapi.in/mf"
//! enrichment_base_url = "https://mf.captnemo.in/kuvera"
//! timeout_secs = 10
//! pacing_ms = 200
//!
//! [pool]
//! workers = 8
//!
//! [delta]
//! stale_threshold_days = 30
//! chunk_size = 50
//!
//! [acceptance]
//! min_year = 2023
//! max_year = 2024
//!
//! [storage]
//! watermark_path = "watermarks/latest.json"
//! sink_root = "lake"
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use chrono::{Datelike, NaiveDate};
use navsync_core::data::HttpSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {} (also searched under {})", .path.display(), .searched.display())]
    NotFound { path: PathBuf, searched: PathBuf },

    #[error("failed to read config {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("invalid config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub pool: PoolConfig,
    pub delta: DeltaConfig,
    pub acceptance: AcceptanceWindow,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub nav_base_url: String,
    pub enrichment_base_url: String,
    pub timeout_secs: u64,
    pub pacing_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            nav_base_url: "https://api.mfapi.in/mf".into(),
            enrichment_base_url: "https://mf.captnemo.in/kuvera".into(),
            timeout_secs: 10,
            pacing_ms: 200,
        }
    }
}

impl ApiConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            pacing: Duration::from_millis(self.pacing_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker bound. `None` uses the host's available parallelism.
    pub workers: Option<usize>,
}

impl PoolConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Subjects whose watermark is older than this are skipped, not fetched.
    pub stale_threshold_days: i64,
    /// Batches per sink commit.
    pub chunk_size: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            stale_threshold_days: 30,
            chunk_size: 50,
        }
    }
}

/// Years whose data is accepted. Checked against the first record of a
/// payload. All fields unset accepts everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceWindow {
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    /// Accept the current year and this many before it. Combined with
    /// `min_year` by taking the later lower bound.
    pub trailing_years: Option<u32>,
}

impl AcceptanceWindow {
    /// Inclusive year bounds for a run on `today`.
    pub fn bounds(&self, today: NaiveDate) -> (Option<i32>, Option<i32>) {
        let trailing = self
            .trailing_years
            .map(|n| today.year() - i32::try_from(n).unwrap_or(i32::MAX));
        let lower = match (self.min_year, trailing) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let upper = match (self.max_year, self.trailing_years) {
            (Some(y), _) => Some(y),
            (None, Some(_)) => Some(today.year()),
            (None, None) => None,
        };
        (lower, upper)
    }

    pub fn accepts(&self, today: NaiveDate, date: NaiveDate) -> bool {
        let (lower, upper) = self.bounds(today);
        let year = date.year();
        lower.map_or(true, |lo| year >= lo) && upper.map_or(true, |hi| year <= hi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub watermark_path: PathBuf,
    pub sink_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            watermark_path: PathBuf::from("watermarks/latest.json"),
            sink_root: PathBuf::from("lake"),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve `path` (searching under the working directory if needed) and load it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: format!("current dir: {e}"),
        })?;
        let resolved = resolve_config_path(path, &cwd)?;
        Self::from_file(&resolved)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta.chunk_size == 0 {
            return Err(ConfigError::Invalid("delta.chunk_size must be at least 1".into()));
        }
        if self.delta.stale_threshold_days < 1 {
            return Err(ConfigError::Invalid(
                "delta.stale_threshold_days must be at least 1".into(),
            ));
        }
        if let (Some(lo), Some(hi)) = (self.acceptance.min_year, self.acceptance.max_year) {
            if lo > hi {
                return Err(ConfigError::Invalid(format!(
                    "acceptance.min_year {lo} is after max_year {hi}"
                )));
            }
        }
        for (name, url) in [
            ("api.nav_base_url", &self.api.nav_base_url),
            ("api.enrichment_base_url", &self.api.enrichment_base_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}

const SEARCH_DEPTH: usize = 6;

/// Use `path` if it is a file; otherwise look for a file with the same name
/// under `search_root`.
pub fn resolve_config_path(path: &Path, search_root: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let not_found = || ConfigError::NotFound {
        path: path.to_path_buf(),
        searched: search_root.to_path_buf(),
    };
    let name = path.file_name().ok_or_else(not_found)?;

    match find_file(search_root, name, SEARCH_DEPTH) {
        Some(found) => {
            warn!(
                requested = %path.display(),
                found = %found.display(),
                "config path is not a file; using match found under working directory"
            );
            Ok(found)
        }
        None => Err(not_found()),
    }
}

fn find_file(dir: &Path, name: &std::ffi::OsStr, depth: usize) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(hit) = entries
        .iter()
        .find(|p| p.is_file() && p.file_name() == Some(name))
    {
        return Some(hit.clone());
    }
    if depth == 0 {
        return None;
    }
    entries
        .iter()
        .filter(|p| p.is_dir() && !is_skipped_dir(p))
        .find_map(|p| find_file(p, name, depth - 1))
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') || n == "target")
}
