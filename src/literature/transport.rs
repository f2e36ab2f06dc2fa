//! HTTP transport seam.

use crate::llm::{LlmHttpConfig, build_http_client};
use crate::{Error, Result};

/// Minimal blocking GET transport.
pub trait HttpTransport: Send + Sync {
    /// Issues a GET request and returns the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] on transport failure or a
    /// non-success status.
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String>;
}

/// [`HttpTransport`] backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given timeouts.
    #[must_use]
    pub fn new(config: LlmHttpConfig) -> Self {
        Self {
            client: build_http_client(config),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(LlmHttpConfig {
            timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| Error::SourceUnavailable {
                resource: url.to_string(),
                cause: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SourceUnavailable {
                resource: url.to_string(),
                cause: format!("HTTP status {status}"),
            });
        }

        response.text().map_err(|e| Error::SourceUnavailable {
            resource: url.to_string(),
            cause: e.to_string(),
        })
    }
}
