//! Trailing-edge debounce.
//!
//! [`Debounced`] collapses a rapid burst of calls into one invocation of the
//! wrapped operation, using the arguments of the last call in the burst. Each
//! call returns its own future: the winning call resolves with the operation's
//! outcome, superseded calls settle with [`DebounceError::Superseded`] instead
//! of hanging forever.
//!
//! Cancellation only prevents a timer that has not yet fired. Once the window
//! elapses and the operation starts, a later call cannot abort it; the later
//! call simply arms the next window.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Why a debounced call did not produce a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebounceError<E> {
    /// A later call arrived within the debounce window and took over.
    #[error("superseded by a later call")]
    Superseded,
    /// This call won the window but the operation failed.
    #[error("operation failed: {0}")]
    Operation(E),
}

/// An async operation wrapped with a trailing-edge debounce window.
///
/// One timer per instance; arming a new one always cancels the previous one
/// first. Dropping the gate cancels an armed, not-yet-fired timer.
pub struct Debounced<F> {
    operation: Arc<F>,
    delay: Duration,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl<F> Debounced<F> {
    /// Wrap `operation` so only the last call in any `delay`-wide burst runs.
    pub fn new(operation: F, delay: Duration) -> Self {
        Self {
            operation: Arc::new(operation),
            delay,
            cancel: Mutex::new(None),
        }
    }

    /// Schedule an invocation with `args`, superseding any timer already armed.
    ///
    /// The timer is armed immediately, not on first poll, so unawaited calls
    /// still participate in the burst.
    pub fn call<A, Fut, T, E>(&self, args: A) -> BoxFuture<'static, Result<T, DebounceError<E>>>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (outcome_tx, outcome_rx) = oneshot::channel::<Result<T, E>>();

        // Swap in the new cancellation handle before spawning the timer, so the
        // superseded timer cannot fire in between. Dropping the old sender is
        // what cancels it.
        if self
            .cancel
            .lock()
            .expect("cancel mutex poisoned")
            .replace(cancel_tx)
            .is_some()
        {
            trace!("superseding previously armed timer");
        }

        let operation = Arc::clone(&self.operation);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = tokio::time::sleep(delay) => {
                    let result = (*operation)(args).await;
                    // The caller may have dropped its future; nothing to do then.
                    let _ = outcome_tx.send(result);
                }
                _ = cancel_rx => {
                    trace!("timer cancelled before firing");
                }
            }
        });

        async move {
            match outcome_rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(DebounceError::Operation(error)),
                Err(_) => Err(DebounceError::Superseded),
            }
        }
        .boxed()
    }
}

impl<F> std::fmt::Debug for Debounced<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::delay;

    /// Records every executed call and answers `result-{query}`.
    fn recording_operation(
        calls: Arc<AtomicU32>,
        seen: Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(String) -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static {
        move |query| {
            let calls = calls.clone();
            let seen = seen.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(query.clone());
                Ok(format!("result-{query}"))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_runs_only_the_last_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = Debounced::new(
            recording_operation(calls.clone(), seen.clone()),
            Duration::from_millis(100),
        );

        let first = gate.call("first".to_string());
        delay(Duration::from_millis(30)).await;
        let second = gate.call("second".to_string());
        delay(Duration::from_millis(30)).await;
        let third = gate.call("third".to_string());

        let (r1, r2, r3) = tokio::join!(first, second, third);

        assert_eq!(r1.unwrap_err(), DebounceError::Superseded);
        assert_eq!(r2.unwrap_err(), DebounceError::Superseded);
        assert_eq!(r3.unwrap(), "result-third");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["third".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_calls_each_execute() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = Debounced::new(
            recording_operation(calls.clone(), seen.clone()),
            Duration::from_millis(50),
        );

        let first = gate.call("one".to_string()).await;
        let second = gate.call("two".to_string()).await;

        assert_eq!(first.unwrap(), "result-one");
        assert_eq!(second.unwrap(), "result-two");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_failure_reaches_the_winning_caller() {
        let gate = Debounced::new(
            |query: String| async move { Err::<String, _>(format!("no results for {query}")) },
            Duration::from_millis(20),
        );

        let error = gate.call("broken".to_string()).await.unwrap_err();
        assert_eq!(
            error,
            DebounceError::Operation("no results for broken".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_fired_timer_cannot_be_superseded() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Debounced::new(
            {
                let calls = calls.clone();
                let seen = seen.clone();
                move |query: String| {
                    let calls = calls.clone();
                    let seen = seen.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        seen.lock().unwrap().push(query.clone());
                        // Slow execution: a later call arrives while this runs.
                        delay(Duration::from_millis(50)).await;
                        Ok::<_, String>(format!("result-{query}"))
                    }
                    .boxed()
                }
            },
            Duration::from_millis(100),
        ));

        let first = gate.call("early".to_string());
        // Past the window: the first timer has fired and its operation is
        // running when the second call arrives.
        delay(Duration::from_millis(120)).await;
        let second = gate.call("late".to_string());

        let (r1, r2) = tokio::join!(first, second);
        assert_eq!(r1.unwrap(), "result-early");
        assert_eq!(r2.unwrap(), "result-late");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["early".to_string(), "late".to_string()]
        );
    }
}
