use super::types::RetryConfig;
use crate::error::ClientError;
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use tracing::{debug, warn};

/// Retry executor with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` additional attempts have failed.
    ///
    /// Non-retryable failures are returned unchanged after a single attempt.
    /// Exhaustion is reported as [`ClientError::RetriesExhausted`] wrapping the
    /// last failure.
    pub async fn run_with_backoff<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempt: u32 = 0;

        loop {
            debug!(
                operation,
                attempt,
                max_retries = self.config.max_retries,
                "Executing request"
            );

            let err = match f().await {
                Ok(result) => {
                    metrics::record_attempt(operation, "success");
                    if attempt > 0 {
                        debug!(operation, attempt, "Request succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                metrics::record_attempt(operation, "non_retryable");
                debug!(operation, attempt, error = %err, "Error not retryable");
                return Err(err);
            }
            metrics::record_attempt(operation, "retryable");

            if attempt >= self.config.max_retries {
                warn!(
                    operation,
                    attempt,
                    max_retries = self.config.max_retries,
                    error = %err,
                    "Request failed after max retries"
                );
                return Err(ClientError::RetriesExhausted {
                    operation: operation.to_string(),
                    retries: self.config.max_retries,
                    source: Box::new(err),
                });
            }

            attempt += 1;
            let wait = backoff
                .next_backoff()
                .unwrap_or_else(|| self.config.delay(attempt));
            debug!(
                operation,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Request failed, retrying after backoff"
            );
            metrics::record_retry(operation);
            tokio::time::sleep(wait).await;
        }
    }

    /// Interval sequence `base, 2*base, 4*base, ...` without jitter, capped
    /// at `max_delay`.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.base_delay())
            .with_max_interval(self.config.max_delay())
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // attempts are bounded by max_retries
            .build()
    }
}
