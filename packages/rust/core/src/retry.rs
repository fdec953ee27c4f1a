//! Bounded retry with per-attempt timeout for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use enhancer_shared::{ProviderError, RetrySettings};

/// Retry budget for one kind of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub attempts: u32,
    /// Delay before attempt `n + 1` is `base_delay * n`.
    pub base_delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            timeout,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// Only transient errors are retried. An attempt exceeding `timeout`
    /// counts as [`ProviderError::Timeout`]. The last error is returned.
    pub async fn run<T, F, Fut>(&self, call: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.attempts {
                if err.is_transient() {
                    warn!(call, attempt, max_attempts = self.attempts, error = %err, "retries exhausted");
                }
                return Err(err);
            }

            let delay = self.base_delay * attempt;
            warn!(
                call,
                attempt,
                max_attempts = self.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.attempts, settings.base_delay(), settings.timeout())
    }
}
