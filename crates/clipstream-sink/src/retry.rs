//! Retry Logic with Exponential Backoff
//!
//! Store writes are retried when the failure is transient: the database was
//! unreachable, or the statement timed out waiting for a lock. Constraint
//! violations and bad statements fail immediately.
//!
//! ```text
//! Attempt 1: immediate
//! Attempt 2: wait initial_backoff
//! Attempt 3: wait initial_backoff * 2
//! Attempt 4: wait initial_backoff * 4      (capped at max_backoff)
//! ```
//!
//! ## Examples
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//!
//! let rows = retry_with_backoff(&policy, "views", || async {
//!     store.execute(&sql, &params).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use clipstream_observability::metrics;
use clipstream_store::StoreError;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for store writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single backoff
    pub max_backoff: Duration,

    /// Growth factor between retries
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }

    pub fn is_retryable(&self, error: &StoreError) -> bool {
        error.is_transient()
    }
}

/// The last error of a failed operation, with how many attempts were made.
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub error: StoreError,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// `table` labels log lines and the retry metric.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    table: &str,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(table, attempt = attempt + 1, "Write succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    warn!(table, error = %error, "Non-retryable store error, giving up");
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt as u32 + 1,
                    });
                }

                if attempt >= policy.max_retries {
                    warn!(
                        table,
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt as u32 + 1,
                    });
                }

                let backoff = policy.backoff(attempt);
                warn!(
                    table,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Retryable store error, backing off"
                );
                metrics::WRITE_RETRIES_TOTAL.with_label_values(&[table]).inc();

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        )
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(300), 2.0);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(300));
        assert_eq!(policy.backoff(8), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_backoff(&fast_policy(3), "test", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Timeout("database is locked".into()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u64, _> = retry_with_backoff(&fast_policy(3), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::ConstraintViolation("NOT NULL".into())) }
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_run_out() {
        let result: Result<u64, _> = retry_with_backoff(&fast_policy(2), "test", || async {
            Err(StoreError::ConnectionFailure("refused".into()))
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(exhausted.error, StoreError::ConnectionFailure(_)));
    }
}
