//! Enrichment API client (captnemo/kuvera-style).
//!
//! `GET {base}/{isin}` returns a JSON array of fund records; only the last
//! element is kept, annotated with the originating subject and category.

use super::http::{HttpFetcher, HttpSettings};
use super::provider::{EnrichmentRecord, EnrichmentSource, TaskError};
use crate::domain::EnrichTask;
use serde_json::{Map, Value};

/// HTTP implementation of `EnrichmentSource`.
#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    http: HttpFetcher,
}

impl EnrichmentClient {
    pub fn new(settings: HttpSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpFetcher::new(settings)?,
        })
    }
}

impl EnrichmentSource for EnrichmentClient {
    fn fetch_enrichment(&self, task: &EnrichTask) -> Result<EnrichmentRecord, TaskError> {
        let url = task.url();
        let items: Vec<Value> = self.http.get_json(&url)?;
        annotate_last(task, &url, items)
    }
}

/// Take the last array element and stamp it with the task's identity.
pub fn annotate_last(
    task: &EnrichTask,
    url: &str,
    items: Vec<Value>,
) -> Result<EnrichmentRecord, TaskError> {
    let last = items.into_iter().last().ok_or_else(|| TaskError::MalformedBody {
        url: url.to_string(),
        message: "empty array".into(),
    })?;

    let mut body: Map<String, Value> = match last {
        Value::Object(map) => map,
        other => {
            return Err(TaskError::MalformedBody {
                url: url.to_string(),
                message: format!("expected object, got {other}"),
            })
        }
    };
    body.insert("scheme_code".into(), Value::String(task.subject_id.clone()));
    body.insert("isin".into(), Value::String(task.secondary_id.clone()));
    body.insert("type_code".into(), Value::String(task.category_code.clone()));

    Ok(EnrichmentRecord {
        subject_id: task.subject_id.clone(),
        isin: task.secondary_id.clone(),
        category_code: task.category_code.clone(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> EnrichTask {
        EnrichTask {
            base_url: "https://mf.captnemo.in/kuvera".into(),
            subject_id: "100".into(),
            secondary_id: "INF209K01YY4".into(),
            category_code: "isinGrowth".into(),
        }
    }

    #[test]
    fn keeps_last_element_and_annotates() {
        let items = vec![
            json!({"code": "OLD", "name": "stale"}),
            json!({"code": "ABGP-GR", "name": "Alpha", "isin": "overwritten"}),
        ];
        let rec = annotate_last(&task(), "u", items).unwrap();
        assert_eq!(rec.subject_id, "100");
        assert_eq!(rec.body["code"], "ABGP-GR");
        assert_eq!(rec.body["scheme_code"], "100");
        assert_eq!(rec.body["isin"], "INF209K01YY4");
        assert_eq!(rec.body["type_code"], "isinGrowth");
    }

    #[test]
    fn empty_array_is_protocol_error() {
        let err = annotate_last(&task(), "u", vec![]).unwrap_err();
        assert!(matches!(err, TaskError::MalformedBody { .. }));
    }

    #[test]
    fn non_object_element_is_protocol_error() {
        let err = annotate_last(&task(), "u", vec![json!(42)]).unwrap_err();
        assert!(matches!(err, TaskError::MalformedBody { .. }));
    }
}
