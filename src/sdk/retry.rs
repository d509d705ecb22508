use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Retry-with-backoff policy for gateway calls.
///
/// Only transient failures (network errors, timeouts, 5xx) are retried.
/// Client errors are surfaced immediately: retrying a rejected Create can
/// duplicate side effects.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt count, including the first call.
    pub attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that performs exactly one attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// The backoff delay after `failed_attempts` failures have occurred.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempts.saturating_sub(1))
    }

    /// Runs `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is exhausted. The backoff wait blocks the calling path; there
    /// is no background retry queue.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut last: Option<Error> = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.delay(attempt - 1)).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::warn!("transient failure (attempt {}/{}): {}", attempt, attempts, e);
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| Error::Internal("retry attempts exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(calls: Arc<AtomicU32>, failures: u32) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32>>>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(Error::Transient("connection refused".to_string()))
                } else {
                    Ok(n + 1)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result = policy.run(flaky(calls.clone(), 2)).await.unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let err = policy.run(flaky(calls.clone(), 99)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let err = policy
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(Error::BadRequest("no".to_string()))
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_non_decreasing() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        let delays: Vec<Duration> = (1..=4).map(|n| policy.delay(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_none_policy_performs_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryPolicy::none()
            .run(flaky(calls.clone(), 99))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
