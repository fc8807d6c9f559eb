//! Bounded retry for connection establishment.
//!
//! Gira actuators are mains powered but are often mounted in window frames
//! at the edge of radio range, so a connect attempt fails now and then. The
//! client retries transient failures a fixed number of times with a
//! doubling, capped delay. Only failures for which [`Error::is_retryable`]
//! holds are retried.
//!
//! ```
//! use gira_core::{Error, RetryConfig, with_retry_notify};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryConfig::with_attempts(3);
//!
//! let handle = with_retry_notify(
//!     &policy,
//!     "connect",
//!     || async { Ok::<_, Error>("link") },
//!     |attempt, err| eprintln!("attempt {attempt} failed: {err}"),
//! )
//! .await?;
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{ConnectionFailureReason, Error, Result};

const DEFAULT_ATTEMPTS: u32 = 5;

/// How often and how patiently a failed connect is repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Pause after the first failure. Doubles for every further failure.
    pub base_delay: Duration,
    /// Upper bound for a single pause.
    pub max_delay: Duration,
    /// Stretch each pause by a random 0-25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_connect()
    }
}

impl RetryConfig {
    /// Five attempts, starting at half a second and capped at five seconds.
    pub fn for_connect() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }

    /// Connect policy with a custom attempt count (at least one).
    pub fn with_attempts(attempts: u32) -> Self {
        Self::for_connect().max_attempts(attempts)
    }

    /// Effective number of attempts. Never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Set the total attempt count (at least one).
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the pause after the first failure.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Enable or disable random stretching of pauses.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Pause to take after the `failures`-th consecutive failure (1-based).
    pub(crate) fn pause_after(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        let pause = self
            .base_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay);
        if !self.jitter {
            return pause;
        }
        let stretch: f64 = rand::rng().random_range(0.0..=0.25);
        pause.mul_f64(1.0 + stretch)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy
/// runs out of attempts.
///
/// `on_retry` receives the 1-based number of the attempt that just failed
/// and its error, before the pause. It is not called for the final
/// attempt. On exhaustion the error of the last attempt is returned
/// unchanged.
pub async fn with_retry_notify<F, Fut, T, N>(
    policy: &RetryConfig,
    what: &str,
    operation: F,
    mut on_retry: N,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(u32, &Error),
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", what, attempt);
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if attempt >= attempts {
            return Err(err);
        }

        let pause = policy.pause_after(attempt);
        warn!(
            "{} attempt {}/{} failed ({}), next try in {:?}",
            what, attempt, attempts, err, pause
        );
        on_retry(attempt, &err);
        tokio::time::sleep(pause).await;
    }
}

/// Final error once every attempt at reaching `device_id` failed.
pub(crate) fn gave_up(device_id: Option<String>, attempts: u32, last_error: &Error) -> Error {
    Error::connection_failed(
        device_id,
        ConnectionFailureReason::RetriesExhausted {
            attempts,
            last_error: last_error.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use gira_types::CodecError;

    fn out_of_range() -> Error {
        Error::connection_failed(None, ConnectionFailureReason::OutOfRange)
    }

    #[test]
    fn test_connect_policy() {
        let policy = RetryConfig::default();
        assert_eq!(policy, RetryConfig::for_connect());
        assert_eq!(policy.attempts(), 5);
        assert_eq!(RetryConfig::with_attempts(2).attempts(), 2);
        assert_eq!(RetryConfig::with_attempts(0).attempts(), 1);
    }

    #[test]
    fn test_pauses_double_up_to_the_cap() {
        let policy = RetryConfig::for_connect().jitter(false);
        let pauses: Vec<_> = (1..=5).map(|n| policy.pause_after(n)).collect();
        assert_eq!(
            pauses,
            [500, 1000, 2000, 4000, 5000].map(Duration::from_millis)
        );
        assert_eq!(policy.pause_after(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_only_stretches() {
        let policy = RetryConfig::for_connect().base_delay(Duration::from_millis(200));
        for _ in 0..32 {
            let pause = policy.pause_after(1);
            assert!(pause >= Duration::from_millis(200), "{:?}", pause);
            assert!(pause <= Duration::from_millis(250), "{:?}", pause);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cover_answers_on_third_attempt() {
        let calls = Cell::new(0);
        let mut retried = Vec::new();

        let link = with_retry_notify(
            &RetryConfig::for_connect(),
            "connect",
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err(out_of_range()) } else { Ok("link") } }
            },
            |attempt, _| retried.push(attempt),
        )
        .await
        .unwrap();

        assert_eq!(link, "link");
        assert_eq!(calls.get(), 3);
        assert_eq!(retried, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let mut retried = 0;

        let err = with_retry_notify(
            &RetryConfig::with_attempts(3),
            "connect",
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(out_of_range()) }
            },
            |_, _| retried += 1,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::ConnectionFailed {
                reason: ConnectionFailureReason::OutOfRange,
                ..
            }
        ));
        assert_eq!(calls.get(), 3);
        assert_eq!(retried, 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);

        let err = with_retry_notify(
            &RetryConfig::for_connect(),
            "connect",
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(Error::device_not_found("AA:BB:CC:DD:EE:FF")) }
            },
            |_, _| panic!("must not retry"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert_eq!(calls.get(), 1);

        let err = with_retry_notify(
            &RetryConfig::for_connect(),
            "encode",
            || async { Err::<(), _>(Error::from(CodecError::position_out_of_range(101))) },
            |_, _| panic!("must not retry"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_gave_up_mentions_attempts() {
        let err = gave_up(Some("AA:BB".to_string()), 5, &out_of_range());
        assert!(err.to_string().contains("5 attempts"));
        assert!(!err.is_retryable());
    }
}
