// file: src/utils/retry.rs
// description: exponential backoff for retryable ingest failures
// reference: https://docs.rs/tokio/latest/tokio/time/fn.sleep.html

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn retry<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempts = attempt + 1, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(operation, attempts = attempt, error = %e, "Giving up after retries");
                        return Err(e);
                    }

                    let backoff = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}
