//! Async pacing and reliability primitives.
//!
//! Five independent wrappers around arbitrary async operations, each with its own
//! timers and state, none invoking another:
//!
//! - [`invoke_with_retry`] — bounded retry with a per-attempt timeout.
//! - [`run_bounded`] — run N tasks with at most K in flight, results in
//!   submission order.
//! - [`Memoized`] — deduplicate concurrent calls and cache successful results
//!   for a TTL, keyed by argument identity.
//! - [`Debounced`] — collapse a burst of calls into a single trailing
//!   invocation.
//! - [`race_fastest`] — invoke alternatives concurrently and adopt the first
//!   success.
//!
//! The wrapped operation is opaque: anything callable that eventually produces a
//! `Result`. The library owns no I/O and persists nothing.
//!
//! # Example
//!
//! ```
//! use pacer::{RetryOptions, invoke_with_retry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let outcome = invoke_with_retry(
//!     || async { Ok::<_, std::io::Error>("hello") },
//!     RetryOptions::default(),
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(outcome.data, "hello");
//! assert_eq!(outcome.attempts, 1);
//! # }
//! ```

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod debounce;
mod memo;
mod pool;
mod race;
mod retry;

pub use debounce::{DebounceError, Debounced};
pub use memo::{MemoError, Memoized};
pub use pool::run_bounded;
pub use race::{AllFailedError, RaceWin, SourceError, race_fastest};
pub use retry::{AttemptError, ExhaustedError, Invocation, RetryOptions, invoke_with_retry};

use std::time::Duration;

/// Suspend the current task for `duration`.
///
/// Thin wrapper over the tokio timer, shared by the retry backoff and by tests.
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}
