//! Retry with a per-attempt timeout.
//!
//! [`invoke_with_retry`] runs an operation up to `max_retries + 1` times, racing
//! every attempt against a deadline. The first success wins; once attempts are
//! exhausted the last observed failure is surfaced unchanged.
//!
//! The deadline is advisory for the operation itself: a timed-out attempt is
//! treated as failed but keeps running detached on its own task, and its eventual
//! result is discarded. Callers that need hard cancellation should build it into
//! the operation.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::debug;

/// Configuration for [`invoke_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Per-attempt deadline. An attempt still running when this elapses is
    /// treated as failed.
    pub timeout: Duration,
    /// Retries allowed after the initial attempt (`max_retries + 1` total
    /// attempts).
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Successful outcome of [`invoke_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<T> {
    /// Value produced by the winning attempt.
    pub data: T,
    /// Wall time from the start of the call to success, retry pauses included.
    pub duration: Duration,
    /// 1-based number of the winning attempt.
    pub attempts: u32,
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    /// The attempt exceeded its deadline.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
    /// The operation itself failed.
    #[error("operation failed: {0}")]
    Operation(E),
}

/// Every attempt failed. Carries the last failure observed, not an aggregate.
#[derive(Debug, Error)]
#[error("all {attempts} attempts failed: {last}")]
pub struct ExhaustedError<E> {
    /// Total attempts made (initial attempt plus retries).
    pub attempts: u32,
    /// The final attempt's failure.
    pub last: AttemptError<E>,
}

/// Invoke `operation`, retrying failed or timed-out attempts.
///
/// Returns as soon as an attempt succeeds; after the final attempt fails, the
/// last failure is returned inside [`ExhaustedError`]. Attempts are spawned so a
/// timed-out operation can keep running detached; a panicking operation resumes
/// its panic in the caller.
pub async fn invoke_with_retry<F, Fut, T, E>(
    operation: F,
    options: RetryOptions,
) -> Result<Invocation<T>, ExhaustedError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let started = Instant::now();
    let total_attempts = options.max_retries + 1;
    let mut last = None;

    for attempt in 1..=total_attempts {
        match run_attempt(operation(), options.timeout).await {
            Ok(data) => {
                debug!(attempt, "attempt succeeded");
                return Ok(Invocation {
                    data,
                    duration: started.elapsed(),
                    attempts: attempt,
                });
            }
            Err(failure) => {
                debug!(attempt, total_attempts, error = %failure, "attempt failed");
                last = Some(failure);
                if attempt < total_attempts {
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        }
    }

    Err(ExhaustedError {
        attempts: total_attempts,
        // total_attempts >= 1, so the loop body ran at least once
        last: last.expect("at least one attempt was made"),
    })
}

/// Race one attempt against its deadline.
///
/// The attempt runs on its own task; when the deadline fires first, the task is
/// left running detached and its handle dropped.
async fn run_attempt<Fut, T, E>(attempt: Fut, deadline: Duration) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut task = tokio::spawn(attempt);
    match timeout(deadline, &mut task).await {
        Ok(Ok(Ok(data))) => Ok(data),
        Ok(Ok(Err(error))) => Err(AttemptError::Operation(error)),
        Ok(Err(join_error)) => std::panic::resume_unwind(join_error.into_panic()),
        Err(_elapsed) => Err(AttemptError::TimedOut(deadline)),
    }
}
