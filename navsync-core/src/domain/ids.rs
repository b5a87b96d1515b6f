use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic chunk ID (run date + member subjects).
///
/// Used to name sink files, so re-running the same chunk on the same day
/// overwrites its own output instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// BLAKE3 over the run date and the sorted subject ids, truncated to 16 hex chars.
    pub fn derive<'a>(run_date: NaiveDate, subjects: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ids: Vec<&str> = subjects.into_iter().collect();
        ids.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(run_date.to_string().as_bytes());
        for id in ids {
            hasher.update(b"\x1f");
            hasher.update(id.as_bytes());
        }
        let hex = hasher.finalize().to_hex();
        Self(hex[..16].to_string())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
