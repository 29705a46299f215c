//! Retry policy and the shared `with_retry` combinator.
//!
//! Every outbound component (provider calls, status queries, artifact
//! transfers) classifies its errors into [`ErrorClass`] and lets
//! [`with_retry`] decide whether and when to try again.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry classification of a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// DNS failure, connection reset/timeout, 5xx.
    Transient,
    /// Provider-specific "too many requests".
    RateLimited,
    /// Auth, quota, malformed parameters, content policy. Never retried.
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

/// Errors that know their own retry classification.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Linear, rate-limit-aware retry schedule.
///
/// Retry `n` waits `base * n`, where the base depends on the failure class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Base used instead of `base_delay` after a rate limit.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(2, Duration::from_secs(2), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, base_delay: Duration, rate_limit_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            rate_limit_delay,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, class: ErrorClass) -> Duration {
        let base = match class {
            ErrorClass::RateLimited => self.rate_limit_delay,
            _ => self.base_delay,
        };
        base.saturating_mul(attempt)
    }

    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }
}

/// Run `op` until it succeeds, fails fatally, or the policy's retry budget is spent.
///
/// `op` receives the 1-indexed attempt number. Fatal errors propagate
/// immediately; transient and rate-limited errors sleep for the
/// attempt-scaled delay of their class before the next attempt.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut retries = 0u32;
    loop {
        match op(retries + 1).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = err.class();
                if !class.is_retryable() || !policy.should_retry(retries) {
                    return Err(err);
                }
                retries += 1;
                let delay = policy.delay_for_attempt(retries, class);
                warn!(
                    operation,
                    retry = retries,
                    class = ?class,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(ErrorClass);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error ({:?})", self.0)
        }
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            self.0
        }
    }

    #[test]
    fn linear_backoff_scales_by_attempt() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(3), Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(1, ErrorClass::Transient), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(2, ErrorClass::Transient), Duration::from_secs(6));
        assert_eq!(policy.delay_for_attempt(3, ErrorClass::Transient), Duration::from_secs(9));
    }

    #[test]
    fn rate_limits_wait_longer() {
        let policy = RetryPolicy::default();
        assert!(
            policy.delay_for_attempt(1, ErrorClass::RateLimited)
                > policy.delay_for_attempt(1, ErrorClass::Transient)
        );
        assert_eq!(policy.delay_for_attempt(2, ErrorClass::RateLimited), Duration::from_secs(10));
    }

    #[test]
    fn first_attempt_waits_nothing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0, ErrorClass::RateLimited), Duration::ZERO);
    }

    #[test]
    fn should_retry_respects_budget() {
        let policy = RetryPolicy::linear(2, Duration::ZERO, Duration::ZERO);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<u32, TestError> = with_retry(&policy, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestError(ErrorClass::Transient))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), TestError> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(ErrorClass::Fatal)) }
        })
        .await;

        assert!(matches!(result, Err(TestError(ErrorClass::Fatal))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(2, Duration::from_secs(1), Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let result: Result<(), TestError> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(ErrorClass::RateLimited)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5s + 10s of rate-limit backoff.
        assert!(started.elapsed() >= Duration::from_secs(15));
    }
}
