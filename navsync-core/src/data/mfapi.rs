//! NAV API client (mfapi.in-style).
//!
//! Endpoints:
//! - `GET {base}`: catalog: `[{schemeCode, schemeName, isinGrowth, isinDivReinvestment}]`
//! - `GET {base}/{id}`: full series: `{meta, data: [{date, nav}], status}`
//! - `GET {base}/{id}/latest`: same shape, newest record only

use super::http::{HttpFetcher, HttpSettings};
use super::provider::{NavSource, TaskError};
use crate::domain::{CatalogEntry, Payload, Task};

/// HTTP implementation of `NavSource`.
#[derive(Debug, Clone)]
pub struct MfApiClient {
    http: HttpFetcher,
}

impl MfApiClient {
    pub fn new(settings: HttpSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpFetcher::new(settings)?,
        })
    }
}

impl NavSource for MfApiClient {
    fn name(&self) -> &str {
        "mfapi"
    }

    fn fetch(&self, task: &Task) -> Result<Payload, TaskError> {
        let url = task.url();
        let payload: Payload = self.http.get_json(&url)?;

        // The API answers unknown codes with 200 and an empty body shape.
        if payload.data.is_empty() && payload.meta.scheme_code.is_none() {
            return Err(TaskError::MalformedBody {
                url,
                message: "payload has neither meta nor data".into(),
            });
        }
        Ok(payload)
    }

    fn fetch_catalog(&self, base_url: &str) -> Result<Vec<CatalogEntry>, TaskError> {
        let url = Task::catalog(base_url).url();
        self.http.get_json(&url)
    }
}
