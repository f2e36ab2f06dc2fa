//! Bounded, caller-supplied retry policy.

use crate::Result;
use crate::config::ExtractionConfig;
use std::time::Duration;

/// Retry policy for fallible calls.
///
/// `max_retries` counts attempts after the first one; zero means a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A policy with no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Builds the policy from extraction settings.
    #[must_use]
    pub const fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Runs `call` until it succeeds or the attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub fn run<T, F>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    metrics::counter!("retries_total", "operation" => operation).increment(1);
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}
