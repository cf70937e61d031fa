//! First-success racing across alternative operations.
//!
//! [`race_fastest`] invokes every alternative concurrently and adopts the
//! fastest successful outcome. A fast failure does not win: if the first
//! alternative to settle failed, the race waits for everyone and scans in
//! declaration order for a success before giving up.

use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::{join_all, select_all};
use thiserror::Error;
use tracing::debug;

/// Successful race outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceWin<T> {
    /// Value produced by the winning alternative.
    pub data: T,
    /// Index of the winner in declaration order.
    pub source: usize,
}

/// One alternative's failure, tagged with its declaration-order index.
#[derive(Debug)]
pub struct SourceError<E> {
    /// The alternative's own error.
    pub error: E,
    /// Index of the failing alternative in declaration order.
    pub source: usize,
}

impl<E: std::fmt::Display> std::fmt::Display for SourceError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source {} failed: {}", self.source, self.error)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for SourceError<E> {}

/// Every alternative failed.
#[derive(Debug, Error)]
#[error("all {} alternatives failed", .errors.len())]
pub struct AllFailedError<E> {
    /// One entry per alternative, in declaration order.
    pub errors: Vec<SourceError<E>>,
}

/// Invoke all `alternatives` concurrently and return the first success.
///
/// If the fastest-settling alternative succeeded, its value and source index
/// are returned immediately without waiting for the rest. If it failed, the
/// race falls back to waiting for every alternative and returns the first
/// success in declaration order. When none succeed, [`AllFailedError`] carries
/// each alternative's failure, tagged with its source index, in declaration
/// order. An empty input fails immediately with an empty error list.
pub async fn race_fastest<F, Fut, T, E>(
    alternatives: Vec<F>,
) -> Result<RaceWin<T>, AllFailedError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    if alternatives.is_empty() {
        return Err(AllFailedError { errors: Vec::new() });
    }

    // Tag every outcome with its source index so no individual failure
    // propagates unhandled out of the race.
    let races: Vec<_> = alternatives
        .into_iter()
        .enumerate()
        .map(|(source, alternative)| {
            let future = alternative();
            async move {
                match future.await {
                    Ok(data) => Ok(RaceWin { data, source }),
                    Err(error) => Err(SourceError { error, source }),
                }
            }
            .boxed()
        })
        .collect();

    let (first, _, remaining) = select_all(races).await;
    let first_failure = match first {
        Ok(win) => {
            debug!(source = win.source, "fastest alternative succeeded");
            return Ok(win);
        }
        Err(failure) => failure,
    };

    debug!(
        source = first_failure.source,
        "fastest alternative failed, waiting for the rest"
    );
    let mut outcomes = join_all(remaining).await;
    outcomes.push(Err(first_failure));
    outcomes.sort_by_key(|outcome| match outcome {
        Ok(win) => win.source,
        Err(failure) => failure.source,
    });

    let mut winner = None;
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(win) if winner.is_none() => winner = Some(win),
            Ok(_) => {}
            Err(failure) => errors.push(failure),
        }
    }
    winner.ok_or(AllFailedError { errors })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::future::BoxFuture;

    use super::*;
    use crate::delay;

    type AltFuture = BoxFuture<'static, Result<&'static str, String>>;

    /// An alternative that settles with `outcome` after `ms` milliseconds.
    fn alternative(
        ms: u64,
        outcome: Result<&'static str, &'static str>,
    ) -> impl FnOnce() -> AltFuture {
        move || {
            async move {
                delay(Duration::from_millis(ms)).await;
                outcome.map_err(str::to_string)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fastest_success_wins() {
        let win = race_fastest(vec![
            alternative(50, Ok("primary")),
            alternative(10, Ok("mirror")),
            alternative(100, Ok("fallback")),
        ])
        .await
        .unwrap();

        assert_eq!(win.data, "mirror");
        assert_eq!(win.source, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_fast_failure_does_not_win() {
        let win = race_fastest(vec![
            alternative(10, Err("primary down")),
            alternative(50, Ok("mirror")),
            alternative(100, Ok("fallback")),
        ])
        .await
        .unwrap();

        assert_eq!(win.data, "mirror");
        assert_eq!(win.source, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_scan_prefers_declaration_order_over_speed() {
        // After the fastest alternative fails, the race waits for everyone and
        // picks the first success by index, not by completion time.
        let win = race_fastest(vec![
            alternative(5, Err("primary down")),
            alternative(100, Ok("slow mirror")),
            alternative(20, Ok("quick fallback")),
        ])
        .await
        .unwrap();

        assert_eq!(win.data, "slow mirror");
        assert_eq!(win.source, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_are_collected_in_order() {
        let error = race_fastest::<_, _, &str, String>(vec![
            alternative(30, Err("first down")),
            alternative(10, Err("second down")),
            alternative(20, Err("third down")),
        ])
        .await
        .unwrap_err();

        assert_eq!(error.errors.len(), 3);
        let sources: Vec<_> = error.errors.iter().map(|e| e.source).collect();
        assert_eq!(sources, vec![0, 1, 2]);
        assert_eq!(error.errors[0].error, "first down");
        assert_eq!(error.errors[2].error, "third down");
    }

    #[tokio::test(start_paused = true)]
    async fn single_alternative_races_against_nobody() {
        let win = race_fastest(vec![alternative(10, Ok("only"))])
            .await
            .unwrap();

        assert_eq!(win.data, "only");
        assert_eq!(win.source, 0);
    }

    #[tokio::test]
    async fn empty_input_fails_with_no_errors() {
        let error = race_fastest::<fn() -> AltFuture, _, _, _>(Vec::new())
            .await
            .unwrap_err();
        assert!(error.errors.is_empty());
    }
}
