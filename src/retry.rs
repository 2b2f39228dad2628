//! Retry execution policy for calls into unreliable collaborators.
//!
//! [`with_retry`] runs a fallible async operation, sleeping with capped
//! exponential backoff between attempts. The error from the last attempt is
//! returned unchanged; earlier failures are only logged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::ExponentialBackoff;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Predicate deciding whether a failed attempt should be retried.
pub type ShouldRetry = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Substrings of transport failures that are worth another attempt.
const TRANSIENT_MARKERS: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "connection reset",
    "timed out",
    "timeout",
    "could not resolve host",
    "name or service not known",
    "temporary failure in name resolution",
];

/// HTTP statuses that indicate a transient server-side condition.
const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503];

/// Serializable retry knobs, as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry policy for [`with_retry`].
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    should_retry: ShouldRetry,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryPolicyConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            should_retry: Arc::new(default_should_retry),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replaces the retry predicate.
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn should_retry(&self, error: &Error) -> bool {
        (self.should_retry)(error)
    }
}

/// Default retry predicate.
///
/// Retryable taxonomy kinds (rate limits, tracker errors created with a
/// retryable override) are retried, and so are failures whose status is
/// 429/502/503 or whose cause chain names a transient network condition.
pub fn default_should_retry(error: &Error) -> bool {
    if error.is_retryable() {
        return true;
    }
    if let Some(status) = error.status_code() {
        return TRANSIENT_STATUSES.contains(&status);
    }
    is_transient_failure(error)
}

/// Whether the error or any of its causes reads like a transient transport failure.
pub fn is_transient_failure(error: &Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        if is_transient_message(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

/// Whether a message names a transient network condition.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

/// Runs `operation` until it succeeds, the policy gives up, or `cancel` fires.
///
/// On success no further attempts or delays happen. When the last attempt
/// fails, or the predicate rejects an error, that error is returned as-is.
/// Cancellation during a delay returns the error that triggered the delay.
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff::new(
        policy.initial_delay,
        policy.max_delay,
        policy.backoff_multiplier,
    );
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= policy.max_attempts || !policy.should_retry(&error) {
            return Err(error);
        }

        let delay = backoff.current();
        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                tracing::warn!(attempt, "retry cancelled");
                return Err(error);
            }
        }

        backoff.next();
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    fn rate_limited() -> Error {
        Error::tracker("rate limited", Some(429), None)
    }

    async fn fail_then_succeed(calls: &AtomicU32, failures: u32) -> Result<&'static str> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(rate_limited())
        } else {
            Ok("done")
        }
    }

    #[tokio::test]
    async fn succeeds_first_time_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            || fail_then_succeed(&calls, 0),
            &fast_policy(),
            &CancelToken::never(),
        )
        .await;
        assert_eq!(assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy().with_max_attempts(3);
        let result = with_retry(
            || fail_then_succeed(&calls, 2),
            &policy,
            &CancelToken::never(),
        )
        .await;
        assert_ok!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_with_last_error() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy().with_max_attempts(3);
        let result = with_retry(
            || fail_then_succeed(&calls, 3),
            &policy,
            &CancelToken::never(),
        )
        .await;
        let err = assert_err!(result);
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::tracker("not found", Some(404), None)) }
            },
            &fast_policy(),
            &CancelToken::never(),
        )
        .await;
        assert_eq!(assert_err!(result).status_code(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_overrides_default() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy().with_should_retry(|_| false);
        let result = with_retry(
            || fail_then_succeed(&calls, 1),
            &policy,
            &CancelToken::never(),
        )
        .await;
        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delays_grow_exponentially() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_attempts(3);

        let start = Instant::now();
        let result = with_retry(
            || fail_then_succeed(&calls, 2),
            &policy,
            &CancelToken::never(),
        )
        .await;
        assert_ok!(result);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(30))
            .with_max_attempts(5);
        let cancel = CancelToken::new();
        cancel.cancel();

        let start = Instant::now();
        let result = with_retry(|| fail_then_succeed(&calls, 10), &policy, &cancel).await;
        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn default_predicate_classification() {
        assert!(default_should_retry(&rate_limited()));
        assert!(default_should_retry(&Error::tracker("forbidden", Some(403), None)));
        assert!(default_should_retry(&Error::tracker("bad gateway", Some(502), None)));
        assert!(default_should_retry(&Error::tracker("unavailable", Some(503), None)));
        assert!(!default_should_retry(&Error::tracker("server error", Some(500), None)));
        assert!(!default_should_retry(&Error::parse("bad yaml")));
        assert!(!default_should_retry(&Error::config("missing token")));
    }

    #[test]
    fn default_predicate_detects_transient_causes() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "read: ECONNRESET");
        assert!(default_should_retry(&Error::workspace_with("push failed", reset)));

        let dns = Error::workspace("fatal: Could not resolve host: github.com");
        assert!(default_should_retry(&dns));

        assert!(!default_should_retry(&Error::workspace("rejected: non-fast-forward")));
    }

    #[test]
    fn policy_defaults_match_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn policy_config_parses_partial_toml() {
        let config: RetryPolicyConfig = toml::from_str("max_attempts = 5").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_ms, 1000);
    }
}
