//! NCBI E-utilities client.

use super::xml::parse_efetch_xml;
use super::{HttpTransport, LiteratureSource, ReqwestTransport, Throttle};
use crate::config::LiteratureConfig;
use crate::models::LiteratureRecord;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Default E-utilities base URL.
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed search and abstract fetch client.
///
/// Every request carries the contact e-mail (and API key, when set) required
/// by the E-utilities usage policy, and waits for the configured minimum
/// interval since the previous request.
pub struct PubMedClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    base_url: String,
    email: String,
    api_key: Option<SecretString>,
    throttle: Throttle,
}

impl PubMedClient<ReqwestTransport> {
    /// Creates a client over the default reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `email` is empty.
    pub fn new(email: impl Into<String>, api_key: Option<SecretString>) -> Result<Self> {
        Self::with_transport(ReqwestTransport::default(), email, api_key)
    }

    /// Creates a client from literature settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no e-mail is configured.
    pub fn from_config(config: &LiteratureConfig) -> Result<Self> {
        let email = config.email.clone().unwrap_or_default();
        let mut client = Self::new(email, config.api_key.clone())?
            .with_min_interval(Duration::from_millis(config.min_interval_ms));
        if let Some(ref base_url) = config.base_url {
            client = client.with_base_url(base_url);
        }
        Ok(client)
    }
}

impl<T: HttpTransport> PubMedClient<T> {
    /// Creates a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `email` is empty.
    pub fn with_transport(
        transport: T,
        email: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self> {
        let email = email.into();
        if email.trim().is_empty() {
            return Err(Error::InvalidInput(
                "a contact e-mail is required by the E-utilities usage policy".to_string(),
            ));
        }
        Ok(Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            email,
            api_key: api_key.filter(|k| !k.expose_secret().is_empty()),
            throttle: Throttle::new(Duration::from_millis(340)),
        })
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the minimum interval between requests.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.throttle = Throttle::new(interval);
        self
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("email", self.email.clone())];
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
        params
    }

    fn get(&self, endpoint: &'static str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{endpoint}", self.base_url);
        let result = self.throttle.run(|| self.transport.get(&url, query));

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("literature_requests_total", "endpoint" => endpoint, "status" => status)
            .increment(1);
        if let Err(ref e) = result {
            tracing::warn!(endpoint, error = %e, "Literature request failed");
        }
        result
    }
}

impl<T: HttpTransport> LiteratureSource for PubMedClient<T> {
    #[tracing::instrument(skip(self), fields(source = "pubmed"))]
    fn search(&self, term: &str, limit: usize) -> Result<Vec<String>> {
        let mut query = vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retmax", limit.to_string()),
            ("retmode", "json".to_string()),
        ];
        query.extend(self.identity_params());

        let body = self.get("esearch.fcgi", &query)?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| Error::OperationFailed {
                operation: "parse_esearch_json".to_string(),
                cause: e.to_string(),
            })?;

        let ids = parsed.esearchresult.idlist;
        tracing::debug!(count = ids.len(), "Literature search returned ids");
        Ok(ids)
    }

    #[tracing::instrument(skip(self, ids), fields(source = "pubmed", count = ids.len()))]
    fn fetch(&self, ids: &[String]) -> Result<Vec<LiteratureRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ];
        query.extend(self.identity_params());

        let body = self.get("efetch.fcgi", &query)?;
        parse_efetch_xml(&body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    esearchresult: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}
