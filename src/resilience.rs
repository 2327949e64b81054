//! Retry logic for transient connection failures.
//!
//! The server holds a single connection established at startup, so the only
//! resilience pattern needed is a bounded retry around that first connect.

use crate::error::ServerError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between delays; `1.0` keeps them constant.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Execute once, never retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Constant delay between a fixed number of attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay applied before the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result, if any.
    pub value: Option<T>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time spent, delays included.
    pub total_duration: Duration,
    /// The last error, if the operation failed.
    pub last_error: Option<ServerError>,
}

impl<T> RetryResult<T> {
    /// Check if the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Convert to a standard Result.
    pub fn into_result(self) -> Result<T, ServerError> {
        match self.value {
            Some(v) => Ok(v),
            None => Err(self
                .last_error
                .unwrap_or_else(|| ServerError::internal("Retry failed with no error captured"))),
        }
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Errors for which [`ServerError::is_transient`] is false end the loop
/// immediately.
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, operation: F) -> RetryResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ServerError>>,
{
    let start = Instant::now();
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt);
            debug!(attempt = attempt + 1, ?delay, "Retrying");
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                return RetryResult {
                    value: Some(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                    last_error: None,
                };
            }
            Err(e) if !e.is_transient() => {
                debug!(error = %e, "Non-transient error, not retrying");
                return RetryResult {
                    value: None,
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                    last_error: Some(e),
                };
            }
            Err(e) => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "Attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    RetryResult {
        value: None,
        attempts,
        total_duration: start.elapsed(),
        last_error,
    }
}

/// [`retry_async`] flattened into a `Result`.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ServerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ServerError>>,
{
    retry_async(config, operation).await.into_result()
}
