//! Bounded retries with exponential backoff for storage calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::IngestConfig;
use crate::error::StorageError;

use super::error::IngestError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    pub fn from_ingest(config: &IngestConfig) -> Self {
        Self::new(config.max_attempts)
            .with_initial_delay(Duration::from_millis(config.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(config.max_backoff_ms))
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before the next attempt after `failures` failed attempts.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(failures as i32 - 1);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the policy is
/// exhausted. Only [`StorageError::is_transient`] failures are retried.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut failures = 0;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                failures += 1;
                if failures >= policy.max_attempts {
                    warn!(operation, attempts = failures, error = %e, "storage retries exhausted");
                    return Err(IngestError::StorageUnavailable { attempts: failures });
                }
                let delay = policy.delay_for_attempt(failures);
                warn!(
                    operation,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient storage failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(operation, error = %e, "permanent storage failure");
                return Err(IngestError::Storage(e));
            }
        }
    }
}
