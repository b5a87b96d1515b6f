//! Immutable fetch descriptors.
//!
//! A task carries plain values only, so it can be cloned into any worker
//! without sharing state.

use super::SubjectId;
use serde::{Deserialize, Serialize};

/// One NAV fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Endpoint root, e.g. `https://api.mfapi.in/mf`.
    pub base_url: String,
    /// `None` pulls the full catalog from `base_url`.
    pub subject_id: Option<SubjectId>,
    /// Hit `/{id}/latest` instead of the full series.
    pub latest_only: bool,
}

impl Task {
    pub fn new(base_url: impl Into<String>, subject_id: impl Into<SubjectId>, latest_only: bool) -> Self {
        Self {
            base_url: base_url.into(),
            subject_id: Some(subject_id.into()),
            latest_only,
        }
    }

    /// Full-catalog pull.
    pub fn catalog(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            subject_id: None,
            latest_only: false,
        }
    }

    /// Key under which this task's result is collected.
    pub fn key(&self) -> &str {
        self.subject_id.as_deref().unwrap_or("")
    }

    /// `{base}/{id}/latest`, `{base}/{id}`, or `{base}`.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.subject_id.as_deref() {
            Some(id) if !id.is_empty() => {
                if self.latest_only {
                    format!("{base}/{id}/latest")
                } else {
                    format!("{base}/{id}")
                }
            }
            _ => base.to_string(),
        }
    }
}

/// One enrichment fetch: a subject looked up by one of its ISINs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichTask {
    pub base_url: String,
    pub subject_id: SubjectId,
    /// The ISIN used for the lookup.
    pub secondary_id: String,
    /// Which ISIN category the lookup came from (`isinGrowth`, ...).
    pub category_code: String,
}

impl EnrichTask {
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.secondary_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.mfapi.in/mf";

    #[test]
    fn latest_only_hits_latest_endpoint() {
        let task = Task::new(BASE, "300", true);
        assert_eq!(task.url(), "https://api.mfapi.in/mf/300/latest");
    }

    #[test]
    fn full_series_url() {
        let task = Task::new(BASE, "300", false);
        assert_eq!(task.url(), "https://api.mfapi.in/mf/300");
    }

    #[test]
    fn catalog_url_is_base_unmodified() {
        assert_eq!(Task::catalog(BASE).url(), BASE);
        // latest flag is meaningless without a subject
        let task = Task {
            base_url: BASE.into(),
            subject_id: None,
            latest_only: true,
        };
        assert_eq!(task.url(), BASE);
    }

    #[test]
    fn trailing_slash_trimmed() {
        let task = Task::new("https://api.mfapi.in/mf/", "1", false);
        assert_eq!(task.url(), "https://api.mfapi.in/mf/1");
    }

    #[test]
    fn enrich_url_uses_isin() {
        let task = EnrichTask {
            base_url: "https://mf.captnemo.in/kuvera/".into(),
            subject_id: "100".into(),
            secondary_id: "INF123A01011".into(),
            category_code: "isinGrowth".into(),
        };
        assert_eq!(task.url(), "https://mf.captnemo.in/kuvera/INF123A01011");
    }
}
