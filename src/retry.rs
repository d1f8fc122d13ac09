//! Bounded retry combinators.
//!
//! Every "try again until it looks right" loop in the pipeline goes through
//! here, so that each one has an explicit attempt cap and a typed outcome
//! instead of an open-ended `loop`.
//!
//! # Example
//!
//! ```
//! use promptloom::retry::{retry, RetryOutcome};
//!
//! let mut values = [3, 8, 12].into_iter();
//! let outcome = retry(5, |_| values.next().unwrap_or(0), |v| *v > 10);
//! assert!(matches!(outcome, RetryOutcome::Accepted { value: 12, attempts: 3 }));
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Backoff Constants and Calculation
// ============================================================================

/// Base backoff delay in milliseconds for retry attempts.
pub const RETRY_BACKOFF_BASE_MS: u64 = 500;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 8_000;

/// Multiplier for exponential backoff.
pub const BACKOFF_MULTIPLIER: u64 = 2;

/// Calculate exponential backoff delay for a given attempt number.
///
/// `attempt` is 1-indexed; the first retry uses `base_ms`. The result is
/// capped at `max_ms`.
///
/// ```
/// use promptloom::retry::calculate_backoff;
/// use std::time::Duration;
///
/// assert_eq!(calculate_backoff(1, 500, 8_000), Duration::from_millis(500));
/// assert_eq!(calculate_backoff(3, 500, 8_000), Duration::from_millis(2_000));
/// assert_eq!(calculate_backoff(10, 500, 8_000), Duration::from_millis(8_000));
/// ```
#[must_use]
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = BACKOFF_MULTIPLIER.saturating_pow(exponent);
    let delay = base_ms.saturating_mul(multiplier);
    Duration::from_millis(delay.min(max_ms))
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Attempt cap and backoff settings for an async retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts", rename = "maxAttempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms", rename = "baseDelayMs")]
    pub base_delay_ms: u64,

    /// Upper bound for the delay between attempts, in milliseconds.
    #[serde(default = "default_max_delay_ms", rename = "maxDelayMs")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    RETRY_BACKOFF_BASE_MS
}

fn default_max_delay_ms() -> u64 {
    MAX_BACKOFF_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt cap and default backoff.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Disable the delay between attempts.
    #[must_use]
    pub fn without_delay(mut self) -> Self {
        self.base_delay_ms = 0;
        self.max_delay_ms = 0;
        self
    }

    /// Delay to wait after the given failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

// ============================================================================
// Retry Outcome
// ============================================================================

/// Result of a bounded retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// A value passed the predicate.
    Accepted { value: T, attempts: u32 },
    /// The attempt cap was reached. `last` is the final rejected value, if
    /// any attempt ran at all.
    Exhausted { attempts: u32, last: Option<T> },
}

impl<T> RetryOutcome<T> {
    /// Number of attempts that ran.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Accepted { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Whether a value was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Return the accepted value or map exhaustion to an error.
    ///
    /// # Errors
    ///
    /// Returns whatever `on_exhausted` builds when no value was accepted.
    pub fn into_result<E>(self, on_exhausted: impl FnOnce(u32, Option<T>) -> E) -> Result<T, E> {
        match self {
            Self::Accepted { value, .. } => Ok(value),
            Self::Exhausted { attempts, last } => Err(on_exhausted(attempts, last)),
        }
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Run `op` until `accept` holds or `max_attempts` attempts have run.
///
/// `op` receives the 1-indexed attempt number. A cap of zero runs nothing
/// and returns `Exhausted { attempts: 0, last: None }`.
pub fn retry<T>(
    max_attempts: u32,
    mut op: impl FnMut(u32) -> T,
    mut accept: impl FnMut(&T) -> bool,
) -> RetryOutcome<T> {
    let mut last = None;
    for attempt in 1..=max_attempts {
        let value = op(attempt);
        if accept(&value) {
            return RetryOutcome::Accepted {
                value,
                attempts: attempt,
            };
        }
        last = Some(value);
    }
    RetryOutcome::Exhausted {
        attempts: max_attempts,
        last,
    }
}

/// Async variant of [`retry`] for fallible operations.
///
/// Errors from `op` propagate immediately; only values rejected by `accept`
/// are retried, with the policy's backoff between attempts.
///
/// # Errors
///
/// Returns the first error produced by `op`.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
    mut accept: impl FnMut(&T) -> bool,
) -> Result<RetryOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last = None;
    for attempt in 1..=policy.max_attempts {
        let value = op(attempt).await?;
        if accept(&value) {
            return Ok(RetryOutcome::Accepted {
                value,
                attempts: attempt,
            });
        }
        last = Some(value);
        if attempt < policy.max_attempts {
            let delay = policy.delay_after(attempt);
            debug!("Attempt {} rejected, retrying in {:?}", attempt, delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
    Ok(RetryOutcome::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_exponential_and_capped() {
        assert_eq!(calculate_backoff(1, 100, 1_000), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, 100, 1_000), Duration::from_millis(200));
        assert_eq!(calculate_backoff(4, 100, 1_000), Duration::from_millis(800));
        assert_eq!(calculate_backoff(5, 100, 1_000), Duration::from_millis(1_000));
        assert_eq!(calculate_backoff(64, 100, 1_000), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_attempt_zero_uses_base() {
        assert_eq!(calculate_backoff(0, 100, 1_000), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_accepts_first_success() {
        let outcome = retry(5, |attempt| attempt * 10, |v| *v >= 30);
        assert_eq!(
            outcome,
            RetryOutcome::Accepted {
                value: 30,
                attempts: 3
            }
        );
    }

    #[test]
    fn test_retry_exhausts_with_last_value() {
        let calls = Cell::new(0);
        let outcome = retry(
            4,
            |attempt| {
                calls.set(calls.get() + 1);
                attempt
            },
            |_| false,
        );
        assert_eq!(calls.get(), 4);
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 4,
                last: Some(4)
            }
        );
    }

    #[test]
    fn test_retry_zero_attempts_runs_nothing() {
        let outcome: RetryOutcome<u32> = retry(0, |_| panic!("must not run"), |_| true);
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 0,
                last: None
            }
        );
    }

    #[test]
    fn test_into_result_maps_exhaustion() {
        let outcome: RetryOutcome<u32> = RetryOutcome::Exhausted {
            attempts: 2,
            last: Some(7),
        };
        let result: Result<u32, String> =
            outcome.into_result(|attempts, last| format!("{} tries, last {:?}", attempts, last));
        assert_eq!(result.unwrap_err(), "2 tries, last Some(7)");
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
        let policy: RetryPolicy = serde_json::from_str(r#"{"maxAttempts": 7}"#).unwrap();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.base_delay_ms, RETRY_BACKOFF_BASE_MS);
    }

    #[tokio::test]
    async fn test_retry_async_accepts_after_rejections() {
        let policy = RetryPolicy::new(5).without_delay();
        let outcome: Result<RetryOutcome<Vec<u8>>, String> = retry_async(
            &policy,
            |attempt| async move {
                if attempt < 3 {
                    Ok(Vec::new())
                } else {
                    Ok(vec![1, 2, 3])
                }
            },
            |images| !images.is_empty(),
        )
        .await;
        let outcome = outcome.unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts(), 3);
    }

    #[tokio::test]
    async fn test_retry_async_propagates_errors() {
        let policy = RetryPolicy::new(5).without_delay();
        let result: Result<RetryOutcome<u32>, String> = retry_async(
            &policy,
            |attempt| async move {
                if attempt == 2 {
                    Err("backend down".to_string())
                } else {
                    Ok(0)
                }
            },
            |_| false,
        )
        .await;
        assert_eq!(result.unwrap_err(), "backend down");
    }

    #[tokio::test]
    async fn test_retry_async_exhausts() {
        let policy = RetryPolicy::new(2).without_delay();
        let result: Result<RetryOutcome<u32>, String> =
            retry_async(&policy, |_| async { Ok(0) }, |_| false).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.attempts(), 2);
        assert!(!outcome.is_accepted());
    }
}
