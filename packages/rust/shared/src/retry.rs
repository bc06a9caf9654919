//! Retry with exponential backoff.
//!
//! One policy type drives every retried external call. An operation either
//! fails outright (`Err`) or returns a value the caller's acceptance predicate
//! may still reject (e.g. an HTTP 500 response). Both count as a failed attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bounded retry policy: `max_attempts` tries, sleeping `base_delay * 2^n`
/// after the n-th failure (0-based). No sleep follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Why the last attempt did not count as a success.
#[derive(Debug)]
pub enum AttemptFailure<T, E> {
    /// The operation completed but the acceptance predicate rejected its output.
    Rejected(T),
    /// The operation returned an error.
    Failed(E),
}

/// Every attempt failed; carries the most recent failure.
#[derive(Debug)]
pub struct RetryExhausted<T, E> {
    pub attempts: u32,
    pub last: AttemptFailure<T, E>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }

    /// Run `op` until `accept` approves its output or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut op: F,
        accept: P,
    ) -> std::result::Result<T, RetryExhausted<T, E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&T) -> bool,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match op(attempt).await {
                Ok(value) if accept(&value) => {
                    debug!(attempt, "attempt succeeded");
                    return Ok(value);
                }
                Ok(value) => {
                    warn!(attempt, max, "attempt returned an unaccepted result");
                    AttemptFailure::Rejected(value)
                }
                Err(e) => {
                    warn!(attempt, max, error = %e, "attempt failed");
                    AttemptFailure::Failed(e)
                }
            };

            if attempt >= max {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.delay_after(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
            tokio::time::sleep(delay).await;
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let start = Instant::now();

        let out: std::result::Result<u32, RetryExhausted<u32, String>> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(format!("boom {attempt}"))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff, no sleep after the winning attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_values_count_as_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let start = Instant::now();

        let out = policy
            .run(|_| async { Ok::<u16, String>(500) }, |status| *status < 300)
            .await;

        let exhausted = out.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(exhausted.last, AttemptFailure::Rejected(500)));
        // 10ms + 20ms; nothing after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay: Duration::ZERO,
        };
        let out = policy
            .run(|_| async { Err::<(), _>("nope") }, |_| true)
            .await;
        assert_eq!(out.unwrap_err().attempts, 1);
    }

    #[test]
    fn policy_deserializes_from_millis() {
        let policy: RetryPolicy =
            toml::from_str("max_attempts = 4\nbase_delay = 250\n").unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }
}
