//! Bounded retry with exponential backoff for transient errors.
//!
//! Only [`ProvisionError::TransientRemote`] is retried. Everything else
//! (permission problems, bad configuration, timeouts) fails on the first
//! attempt so the operator sees it immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::ProvisionError;

/// Retry configuration for operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Self::default()
        }
    }

    /// Calculate the delay after a given (zero-based) failed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(10)).unwrap_or(10);
        let multiplier = self.backoff_multiplier.powi(exp);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Returns the final result together with the number of attempts made.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> (Result<T, ProvisionError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return (Ok(value), attempts),
            Err(e) if e.is_transient() && config.should_retry(attempts) => {
                let delay = config.delay_for_attempt(attempts - 1);
                warn!(
                    operation = %operation_name,
                    attempt = attempts,
                    error = %e,
                    delay_secs = delay.as_secs(),
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_transient() {
                    error!(
                        operation = %operation_name,
                        attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                }
                return (Err(e), attempts);
            }
        }
    }
}
