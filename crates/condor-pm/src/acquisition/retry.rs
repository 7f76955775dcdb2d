use std::future::Future;
use std::time::Duration;

use super::{AcquisitionError, FetchError};

/// How transient fetch failures are retried.
///
/// Attempt `n` (from 1) that fails transiently waits
/// `timeout * backoff^(n - 1)` before the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration, backoff: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            backoff,
        }
    }

    /// Wait after the failed attempt `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.timeout.mul_f64(self.backoff.max(1.0).powi(exponent))
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, AcquisitionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    return Err(AcquisitionError::Permanent {
                        target: label.to_string(),
                        source: err,
                    });
                }
                Err(err) if attempt >= self.max_attempts => {
                    return Err(AcquisitionError::RetriesExhausted {
                        target: label.to_string(),
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay(attempt);
                    log::warn!("Fetching {} failed ({}), retrying in {:?}", label, err, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> FetchError {
        FetchError::Status {
            status: 503,
            url: "https://example.com/linux-64/repodata.json".to_string(),
        }
    }

    #[test]
    fn test_delay_grows_by_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), 3.0);
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(300));
        assert_eq!(policy.delay(3), Duration::from_millis(900));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, 2.0);
        assert_eq!(policy.max_attempts, 1);

        let err = tokio_test::block_on(policy.run("noarch", || async { Err::<(), _>(unavailable()) })).unwrap_err();
        assert!(matches!(err, AcquisitionError::RetriesExhausted { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = policy
            .run("conda-forge/linux-64", || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_failure() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), 1.0);

        let err = policy
            .run("conda-forge/linux-64", || async { Err::<(), _>(unavailable()) })
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(err, AcquisitionError::RetriesExhausted { attempts: 2, .. }));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), 1.0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = policy
            .run("conda-forge/linux-64", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Status {
                    status: 404,
                    url: "https://example.com".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
