//! Blocking JSON GET with a timeout and fixed post-request pacing.
//!
//! Shared by the NAV and enrichment clients. There is no retry: one call,
//! one result. The pacing sleep runs after every call, successful or not,
//! so a pool of N workers issues at most N requests per pacing interval.

use super::provider::TaskError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Connection settings injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub pacing: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            pacing: Duration::from_millis(200),
        }
    }
}

/// Thin wrapper over `reqwest::blocking::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    pacing: Duration,
}

impl HttpFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("navsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            pacing: settings.pacing,
        })
    }

    /// GET `url` and decode the body as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TaskError> {
        let result = self.get_json_unpaced(url);
        if !self.pacing.is_zero() {
            std::thread::sleep(self.pacing);
        }
        result
    }

    fn get_json_unpaced<T: DeserializeOwned>(&self, url: &str) -> Result<T, TaskError> {
        debug!(url, "GET");
        let resp = self.client.get(url).send().map_err(|e| TaskError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TaskError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| TaskError::Transport {
            url: url.to_string(),
            message: format!("reading body: {e}"),
        })?;

        serde_json::from_str(&body).map_err(|e| TaskError::MalformedBody {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let s = HttpSettings::default();
        assert_eq!(s.timeout, Duration::from_secs(10));
        assert_eq!(s.pacing, Duration::from_millis(200));
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let fetcher = HttpFetcher::new(HttpSettings {
            timeout: Duration::from_millis(500),
            pacing: Duration::ZERO,
        })
        .unwrap();

        // Reserve an ephemeral port, then release it so nothing listens there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = fetcher
            .get_json::<serde_json::Value>(&format!("http://127.0.0.1:{port}/mf"))
            .unwrap_err();
        assert!(matches!(err, TaskError::Transport { .. }), "got {err:?}");
    }
}
