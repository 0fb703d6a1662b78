//! Bounded exponential backoff for RPC retries

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::chain::{ErrorClass, ErrorClassifier};
use crate::error::{RelayError, RpcError};

/// Retry configuration for RPC calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries of the same request before giving up on it
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff for a single wait
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
    /// Cap on the sum of all waits within one fetch or call
    pub max_total_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            max_total_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// No waiting at all; used by tests and dry runs against local nodes
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_total_backoff: Duration::ZERO,
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Tracks waits spent within one fetch against `max_total_backoff`
#[derive(Debug, Clone, Default)]
pub struct BackoffBudget {
    spent: Duration,
}

impl BackoffBudget {
    /// Reserve the wait for `attempt`, or `None` when it would exceed the budget
    pub fn reserve(&mut self, config: &RetryConfig, attempt: u32) -> Option<Duration> {
        let wait = config.backoff_for_attempt(attempt);
        let total = self.spent + wait;
        if total > config.max_total_backoff {
            return None;
        }
        self.spent = total;
        Some(wait)
    }

    pub fn spent(&self) -> Duration {
        self.spent
    }
}

/// Run a single-value RPC call (head, nonce) with bounded retry
///
/// Transient and rate-limit errors are retried with backoff until
/// `max_retries` or `max_total_backoff` runs out, which surfaces as
/// [`RelayError::TransientRpc`]. Fatal errors are returned straight away.
pub async fn call_with_retry<T, F, Fut>(
    classifier: &dyn ErrorClassifier,
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut budget = BackoffBudget::default();
    let mut attempt = 0u32;

    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if classifier.classify(&err) == ErrorClass::Fatal {
            return Err(RelayError::Rpc(err));
        }

        let wait = if config.should_retry(attempt) {
            budget.reserve(config, attempt)
        } else {
            None
        };
        let Some(wait) = wait else {
            return Err(RelayError::TransientRpc {
                attempts: attempt + 1,
                source: err,
            });
        };

        warn!(
            operation,
            attempt = attempt + 1,
            ?wait,
            error = %err,
            "Retrying RPC call"
        );
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        attempt += 1;
    }
}
