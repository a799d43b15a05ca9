//! # Read Retry
//!
//! Reads (customer lookup, membership, offers, catalog, verification) are
//! safe to repeat, so transient failures are retried with exponential
//! backoff inside one overall time budget.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 ──✗ transient──► sleep 200ms ──► attempt 2 ──✗──► sleep 400ms│
//! │      │                                          │                       │
//! │      ✓ → Ok                           ✗ permanent → ReadFailure now     │
//! │                                                                         │
//! │  max_attempts reached → ReadFailure::Exhausted                         │
//! │  budget (lookup timeout) spent → ReadFailure::TimedOut                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commits never go through here.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::BackendError;

/// How reads are bounded and retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Budget for the whole read, retries and sleeps included.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        ReadPolicy {
            timeout: Duration::from_secs(8),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Why a read gave up. Nothing was changed in any case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadFailure {
    #[error("{operation} timed out after {timeout:?}")]
    TimedOut {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last_error: BackendError,
    },

    /// A non-transient error; not retried.
    #[error("{operation} failed: {error}")]
    Permanent {
        operation: &'static str,
        error: BackendError,
    },
}

/// Runs `call` until it succeeds, fails permanently, runs out of attempts
/// or the policy's time budget is spent.
pub async fn read_with_retry<T, F, Fut>(
    policy: &ReadPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, ReadFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = async {
        let mut backoff = ExponentialBackoff {
            initial_interval: policy.initial_backoff,
            max_interval: policy.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => {
                    return Err(ReadFailure::Permanent { operation, error });
                }
                Err(error) if attempt >= policy.max_attempts => {
                    return Err(ReadFailure::Exhausted {
                        operation,
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                    debug!(operation, attempt, ?delay, %error, "Read failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    };

    let result = match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(ReadFailure::TimedOut {
            operation,
            timeout: policy.timeout,
        }),
    };

    if let Err(failure) = &result {
        warn!(operation, %failure, "Read gave up");
    }
    result
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> ReadPolicy {
        ReadPolicy {
            timeout: Duration::from_secs(8),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = read_with_retry(&policy(), "lookup", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BackendError::Unavailable("pool exhausted".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = read_with_retry(&policy(), "lookup", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Conflict("database is locked".into()))
        })
        .await;

        assert!(matches!(result, Err(ReadFailure::Exhausted { attempts: 3, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = read_with_retry(&policy(), "lookup", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Internal("bad row".into()))
        })
        .await;

        assert!(matches!(result, Err(ReadFailure::Permanent { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_read_times_out() {
        let result: Result<(), _> = read_with_retry(&policy(), "lookup", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(ReadFailure::TimedOut {
                operation: "lookup",
                timeout: Duration::from_secs(8),
            })
        );
    }
}
