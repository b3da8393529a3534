//! Bounded exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How often, and how patiently, to retry an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
        }
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: E,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        if scaled.is_finite() && scaled < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_delay
        }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] with the last error once `max_attempts` attempts
    /// have failed.
    pub async fn run<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, Exhausted<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(
                            operation = operation_name,
                            attempts = attempts,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if attempts >= max_attempts => {
                    error!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after maximum retries"
                    );
                    return Err(Exhausted {
                        attempts,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempts);
                    warn!(
                        operation = operation_name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
