//! Exponential backoff for transient remote failures.

use rand::Rng as _;
use std::future::Future;
use std::time::Duration;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff configuration with jitter so that parallel
/// consumers recovering from the same outage don't stampede the backend.
///
/// The defaults mirror the storefront's query layer: three retries,
/// doubling from one second, capped at thirty.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; handy in tests and for one-shot calls.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Compute the delay before a given retry attempt (0-indexed).
    ///
    /// Formula: `min(base_delay * 2^attempt, max_delay) + jitter(0..base_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_delay.as_millis() as u64);
        let jitter = if base > 0 { rand::thread_rng().gen_range(0..base) } else { 0 };
        Duration::from_millis(capped + jitter)
    }
}

/// Retry an async operation with exponential backoff and jitter.
///
/// - `policy`: backoff configuration
/// - `classify`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error once retries are
/// exhausted or the classifier aborts.
pub async fn retry_with_backoff<F, Fut, T, E, C>(policy: &RetryPolicy, classify: C, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Debug,
{
    // 1 initial attempt + max_retries retries
    let total_attempts = policy.max_retries + 1;
    let mut last_err: Option<E> = None;

    for attempt in 0..total_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if classify(&err) == RetryAction::Abort {
                    return Err(err);
                }
                if attempt + 1 >= total_attempts {
                    last_err = Some(err);
                    break;
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?err,
                    "transient failure, retrying",
                );
                tokio::time::sleep(delay).await;
            },
        }
    }

    Err(last_err.expect("loop must have run at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn immediate(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_grows_exponentially_within_bounds() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
        };
        // attempt 0: 200ms + jitter(0..200ms)
        let d = policy.delay_for(0);
        assert!(d >= Duration::from_millis(200) && d < Duration::from_millis(400));
        // attempt 2: 800ms + jitter(0..200ms)
        let d = policy.delay_for(2);
        assert!(d >= Duration::from_millis(800) && d < Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        // 1s * 2^10 >> 30s, so capped at 30s + jitter(0..1s)
        let d = policy.delay_for(10);
        assert!(d >= Duration::from_secs(30) && d < Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result: Result<i32, String> =
            retry_with_backoff(&immediate(3), |_| RetryAction::Retry, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_abort_skips_remaining_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(&immediate(3), |_| RetryAction::Abort, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(&immediate(3), |_| RetryAction::Retry, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<i32, String> = retry_with_backoff(&immediate(2), |_| RetryAction::Retry, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("still failing".to_string())
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "still failing");
        // 1 initial + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
