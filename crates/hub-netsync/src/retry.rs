//! Bounded retry for router calls
//!
//! Fixed delay between attempts, the same budget for hard errors and
//! timeouts. Each attempt is bounded by the per-call timeout.

use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::RouterError;
use crate::settings::RouterSettings;

/// Retry budget for one router operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub tries: u32,
    /// Delay between attempts
    pub backoff: Duration,
    /// Bound on each attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RouterSettings::default())
    }
}

/// Final result plus the attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, RouterError>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy from router settings
    pub fn from_settings(settings: &RouterSettings) -> Self {
        Self {
            tries: settings.retry.tries.max(1),
            backoff: Duration::from_secs(settings.retry.backoff_secs),
            timeout: settings.timeout(),
        }
    }

    /// Single attempt, same timeout
    pub fn once(timeout: Duration) -> Self {
        Self {
            tries: 1,
            backoff: Duration::ZERO,
            timeout,
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.backoff)
            .with_max_times(self.tries.saturating_sub(1) as usize)
    }

    /// Run `call` until it succeeds, fails permanently or the budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RouterError>>,
    {
        let attempts = AtomicU32::new(0);
        let timeout = self.timeout;

        let result = (|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            let attempt = call();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(RouterError::Timeout(timeout)),
                }
            }
        })
        .retry(self.backoff())
        .when(RouterError::is_retryable)
        .notify(|err: &RouterError, delay: Duration| {
            tracing::warn!(
                operation,
                attempt = attempts.load(Ordering::Relaxed),
                error = %err,
                delay = ?delay,
                "router call failed, retrying"
            );
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        if let Err(e) = &result {
            tracing::error!(operation, attempts, error = %e, "router call failed");
        }
        Attempted { result, attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(tries: u32) -> RetryPolicy {
        RetryPolicy {
            tries,
            backoff: Duration::ZERO,
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_policy_from_default_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.tries, 3);
        assert_eq!(policy.backoff, Duration::from_secs(60));
        assert_eq!(policy.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Attempted<()> = fast(3)
            .run("disable_user", move || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Err(RouterError::Auth("denied".into()))
            })
            .await;

        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(out.result.unwrap_err(), RouterError::Auth("denied".into()));
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = fast(3)
            .run("upsert", move || async move {
                if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err(RouterError::Connection("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(out.attempts, 2);
        assert_eq!(out.result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let out: Attempted<()> = fast(3)
            .run("upsert", || async { Err(RouterError::InvalidResponse("html".into())) })
            .await;
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let out: Attempted<()> = RetryPolicy {
            tries: 2,
            backoff: Duration::ZERO,
            timeout: Duration::from_millis(20),
        }
        .run("kick", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(out.attempts, 2);
        assert_eq!(out.result.unwrap_err(), RouterError::Timeout(Duration::from_millis(20)));
    }
}
