//! Explicit retry policy applied as a wrapper around fallible I/O
//!
//! Rather than baking retry behavior into each call site, a [`RetryPolicy`]
//! value (attempt cap plus backoff curve) is applied by [`with_retry`]. Which
//! errors are worth another attempt is decided by
//! [`crate::FetchError::is_retryable`].

use crate::{FetchError, FetchResult};
use std::future::Future;
use std::time::Duration;

/// Attempt cap and exponential backoff curve for one class of I/O call
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after that
    pub base_delay: Duration,
    /// Ceiling for the backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1` (attempts are counted from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or the attempt
/// cap is reached. The last error is returned as-is.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    with_retry_if(policy, label, FetchError::is_retryable, op).await
}

/// [`with_retry`] generalized over the error type; `retryable` decides
/// which errors deserve another attempt.
pub async fn with_retry_if<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "attempt {}/{} for {} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    label,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retryable() -> FetchError {
        FetchError::RetryableStatus {
            url: "https://x/".to_string(),
            status: 503,
        }
    }

    #[test]
    fn test_backoff_curve() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        // Capped at max_delay.
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(policy, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(retryable())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);
        let result: FetchResult<()> = with_retry(policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(retryable())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: FetchResult<()> =
            with_retry(RetryPolicy::default(), "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Login("bad credentials".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
