//! # Step Retry
//!
//! Every external call the coordinator makes (availability, ledger writes,
//! gateway capture/refund) runs as a step: bounded attempts, a timeout per
//! attempt, exponential backoff between attempts.
//!
//! ## Attempt Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 ──► timeout(step_timeout, op())                             │
//! │                   │                                                     │
//! │                   ├── Ok            → return                            │
//! │                   ├── Err, final    → return Failed(err)               │
//! │                   ├── Err, retryable ┐                                 │
//! │                   └── timed out ─────┤                                 │
//! │                                      ▼                                  │
//! │                   attempts left? ── no ──► return last failure         │
//! │                                      │ yes                              │
//! │                                      ▼                                  │
//! │                   sleep(backoff.next_backoff()) → attempt n+1          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A timed-out attempt may still have taken effect upstream. Steps are
//! only retried through idempotent operations (tokens, idempotency keys),
//! so a repeat never doubles the effect.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RetrySettings;

/// Why a step gave up.
#[derive(Debug)]
pub enum StepError<E> {
    /// The last attempt returned this error.
    Failed(E),
    /// The last attempt did not finish in time.
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for StepError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Failed(e) => write!(f, "{}", e),
            StepError::TimedOut(d) => write!(f, "timed out after {} ms", d.as_millis()),
        }
    }
}

impl<E> StepError<E> {
    /// Collapses the outcome into the step's own error type.
    pub fn into_error(self, timed_out: impl FnOnce(Duration) -> E) -> E {
        match self {
            StepError::Failed(e) => e,
            StepError::TimedOut(d) => timed_out(d),
        }
    }
}

/// Milliseconds for error payloads.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Bounded retry with per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub step_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
            step_timeout: settings.step_timeout(),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    pub async fn run<T, E, F, Fut>(
        &self,
        step: &str,
        mut op: F,
        is_retryable: fn(&E) -> bool,
    ) -> Result<T, StepError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match timeout(self.step_timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(step = %step, attempt, "Step succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => StepError::Failed(e),
                Err(_) => StepError::TimedOut(self.step_timeout),
            };

            let retryable = match &failure {
                StepError::Failed(e) => is_retryable(e),
                StepError::TimedOut(_) => true,
            };

            if !retryable || attempt >= self.max_attempts {
                warn!(step = %step, attempt, error = %failure, "Step failed");
                return Err(failure);
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    debug!(step = %step, attempt, ?delay, error = %failure, "Retrying step");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(failure),
            }
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            // Attempts are bounded by max_attempts instead
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}
