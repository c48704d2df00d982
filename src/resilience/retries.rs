//! Retry logic.
//!
//! # Responsibilities
//! - Run a chain call up to `max_attempts` times
//! - Give every attempt its own deadline
//! - Wait between attempts (fixed by default, exponential + jitter optional)
//!
//! # Design Decisions
//! - Only transient errors are retried; a node rejection or a guard refusal
//!   surfaces immediately
//! - Exhaustion returns the last error, not a synthetic one
//! - Whether a call may be retried at all (transfers) is the caller's decision;
//!   `execute_once` exists for that case

use std::future::Future;
use std::time::Duration;

use crate::blockchain::BlockchainResult;
use crate::config::{BackoffStrategy, RetryConfig};
use crate::observability::metrics;
use crate::resilience::backoff::delay_for;
use crate::resilience::timeouts::with_deadline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    pub attempt_timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            strategy: config.strategy,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th failed attempt.
    pub fn delay_after(&self, failures: u32) -> Duration {
        delay_for(
            self.strategy,
            failures,
            self.delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> BlockchainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BlockchainResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match with_deadline(self.policy.attempt_timeout, call()).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                tracing::debug!(operation, attempt, error = %error, "Permanent failure, not retrying");
                return Err(error);
            }
            if attempt >= self.policy.max_attempts {
                tracing::warn!(operation, attempts = attempt, error = %error, "Retries exhausted");
                return Err(error);
            }

            let delay = self.policy.delay_after(attempt);
            metrics::record_retry(operation);
            tracing::info!(operation, attempt, delay = ?delay, error = %error, "Retrying chain call");
            tokio::time::sleep(delay).await;
        }
    }

    /// Single attempt under the same deadline, for non-idempotent calls.
    pub async fn execute_once<T, Fut>(&self, call: Fut) -> BlockchainResult<T>
    where
        Fut: Future<Output = BlockchainResult<T>>,
    {
        with_deadline(self.policy.attempt_timeout, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Fixed,
            attempt_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = executor(3)
            .execute("get_balance", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BlockchainError::Rpc("connection reset".into()))
                } else {
                    Ok(42u64)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two fixed delays, none after success
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = &AtomicU32::new(0);
        let result: BlockchainResult<()> = executor(3)
            .execute("get_gas_price", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(BlockchainError::Rpc(format!("failure {n}")))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(BlockchainError::Rpc(msg)) if msg == "failure 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: BlockchainResult<()> = executor(3)
            .execute("get_block", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BlockchainError::Rejected("invalid params".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(BlockchainError::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_attempt_times_out_and_retries() {
        let calls = &AtomicU32::new(0);
        let result = executor(2)
            .execute("get_latest_block", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(7u64)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_once_makes_one_attempt() {
        let calls = &AtomicU32::new(0);
        let result: BlockchainResult<()> = executor(3)
            .execute_once(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BlockchainError::Rpc("reset".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
    }
}
