//! Upstream source traits and the per-task error type.
//!
//! `NavSource` and `EnrichmentSource` abstract over the HTTP APIs so the
//! runner can be driven by mocks in tests. Every failure is returned as a
//! `TaskError` value; sources never panic on bad upstream data.

use crate::domain::{CatalogEntry, EnrichTask, Payload, Task};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Timeout, refused connection, broken body.
    Transport,
    /// Non-2xx status or a body that is not the expected JSON.
    Protocol,
    /// The sink rejected a chunk.
    Persistence,
    /// The worker itself failed.
    Internal,
}

/// Failure of a single task, carried as data through the pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    MalformedBody { url: String, message: String },

    #[error("sink rejected chunk {chunk}: {message}")]
    Sink { chunk: String, message: String },

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Transport { .. } => ErrorKind::Transport,
            TaskError::Status { .. } | TaskError::MalformedBody { .. } => ErrorKind::Protocol,
            TaskError::Sink { .. } => ErrorKind::Persistence,
            TaskError::Panicked(_) => ErrorKind::Internal,
        }
    }
}

/// Capability: fetch NAV series and the instrument catalog.
pub trait NavSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch one subject's payload (`{base}/{id}` or `{base}/{id}/latest`).
    fn fetch(&self, task: &Task) -> Result<Payload, TaskError>;

    /// Fetch the full catalog from `base_url`.
    fn fetch_catalog(&self, base_url: &str) -> Result<Vec<CatalogEntry>, TaskError>;
}

/// An enrichment record: the last element of the upstream array, annotated
/// with the subject it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub subject_id: String,
    pub isin: String,
    pub category_code: String,
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Capability: fetch secondary per-ISIN records.
pub trait EnrichmentSource: Send + Sync {
    fn fetch_enrichment(&self, task: &EnrichTask) -> Result<EnrichmentRecord, TaskError>;
}
