//! Generative text backends.
//!
//! The pipeline needs a single-shot completion: prompt in, text out, bounded by
//! a configured maximum output length. No conversation state is kept.

mod ollama;
mod openai;
mod resilience;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use resilience::RetryPolicy;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Trait for generative text providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if the backend cannot be reached or
    /// answers with a non-success status.
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<P: LlmProvider + ?Sized> LlmProvider for Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }
}

/// HTTP client configuration for generative backends.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config settings.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }
}

/// Builds a blocking HTTP client with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Builds the configured provider.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if a hosted provider has no API key.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let http = LlmHttpConfig::from_config(config);
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::Ollama => {
            let mut client = OllamaClient::new().with_max_tokens(config.max_tokens);
            if let Some(ref model) = config.model {
                client = client.with_model(model);
            }
            if let Some(ref base_url) = config.base_url {
                client = client.with_endpoint(base_url);
            }
            Arc::new(client.with_http_config(http))
        },
        LlmProviderKind::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                Error::InvalidInput("an API key is required for the openai provider".to_string())
            })?;
            let mut client = OpenAiClient::new(api_key).with_max_tokens(config.max_tokens);
            if let Some(ref model) = config.model {
                client = client.with_model(model);
            }
            if let Some(ref base_url) = config.base_url {
                client = client.with_endpoint(base_url);
            }
            Arc::new(client.with_http_config(http))
        },
    };

    tracing::debug!(provider = provider.name(), max_tokens = config.max_tokens, "Built generative provider");
    Ok(provider)
}

/// Maps a reqwest transport error onto the crate error, logging its kind.
pub(crate) fn transport_error(provider: &'static str, url: &str, e: &reqwest::Error) -> Error {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else {
        "unknown"
    };
    tracing::error!(
        provider,
        error = %e,
        error_kind,
        "Generative backend request failed"
    );
    Error::SourceUnavailable {
        resource: url.to_string(),
        cause: format!("{error_kind} error: {e}"),
    }
}

/// Converts a non-success response into [`Error::SourceUnavailable`].
pub(crate) fn status_error(
    provider: &'static str,
    url: &str,
    response: reqwest::blocking::Response,
) -> Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    tracing::error!(provider, status = %status, "Generative backend returned error status");
    Error::SourceUnavailable {
        resource: url.to_string(),
        cause: format!("API returned status: {status} - {body}"),
    }
}
