//! Bounded-concurrency batch execution.
//!
//! [`run_bounded`] executes N independent tasks with at most `min(limit, N)` in
//! flight, writing each result into a slot keyed by the task's submission index.
//! Completion order varies with task timing; output order never does.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::try_join_all;
use tracing::trace;

/// Run `tasks` with at most `limit` concurrently in flight.
///
/// Results come back in submission order regardless of completion order. The
/// first task failure fails the whole batch immediately; unfinished results are
/// discarded.
///
/// A `limit` of 1 executes strictly sequentially in task order; a `limit` of at
/// least `tasks.len()` behaves as full concurrency. A `limit` of zero is clamped
/// to 1.
pub async fn run_bounded<F, Fut, T, E>(tasks: Vec<F>, limit: usize) -> Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let count = tasks.len();
    let workers = limit.clamp(1, count);
    let cursor = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..count).map(|_| None).collect());
    let tasks: Vec<Mutex<Option<F>>> = tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();

    trace!(count, workers, "running bounded batch");
    try_join_all((0..workers).map(|_| worker(&tasks, &cursor, &slots))).await?;

    let slots = slots.into_inner().expect("slots mutex poisoned");
    Ok(slots
        .into_iter()
        .map(|slot| slot.expect("every slot is written before the workers finish"))
        .collect())
}

/// One worker: claim the next unclaimed index, run that task, write its slot.
async fn worker<F, Fut, T, E>(
    tasks: &[Mutex<Option<F>>],
    cursor: &AtomicUsize,
    slots: &Mutex<Vec<Option<T>>>,
) -> Result<(), E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        if index >= tasks.len() {
            return Ok(());
        }
        let task = tasks[index]
            .lock()
            .expect("task mutex poisoned")
            .take()
            .expect("each index is claimed exactly once");
        let value = task().await?;
        slots.lock().expect("slots mutex poisoned")[index] = Some(value);
    }
}
