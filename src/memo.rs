//! TTL memoization with in-flight call deduplication.
//!
//! [`Memoized`] wraps an N-argument async operation. Calls are keyed by a
//! canonical JSON serialization of their arguments: a cache hit returns the
//! stored value without new work, a call that is still in flight is joined
//! rather than repeated, and anything else invokes the operation. Successful
//! results live in the cache until their TTL elapses; failures are forwarded to
//! every waiting caller and never cached.
//!
//! Key encoding is order-sensitive: two argument values that serialize
//! differently (for example map-like types with unstable iteration order) are
//! treated as distinct even if structurally equal. Use types with a stable
//! serialization when deduplication matters.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

/// An in-flight call, shareable across every caller with the same key.
type SharedCall<T, E> = Shared<BoxFuture<'static, Result<T, Arc<E>>>>;

/// Why a memoized call failed.
#[derive(Debug, Error)]
pub enum MemoError<E> {
    /// The argument list could not be serialized into a cache key.
    #[error("failed to build cache key: {0}")]
    Key(#[from] serde_json::Error),
    /// The underlying call failed. The error is shared by every caller that
    /// awaited the same in-flight call, hence the `Arc`.
    #[error("call failed: {0}")]
    Operation(Arc<E>),
}

struct State<T, E> {
    cache: HashMap<String, T>,
    pending: HashMap<String, SharedCall<T, E>>,
}

/// An async operation wrapped with deduplication and TTL caching.
///
/// Constructed once per operation; owns its own cache, pending map, and
/// eviction timers. Dropping the wrapper does not cancel in-flight calls.
pub struct Memoized<F, T, E> {
    operation: F,
    ttl: Duration,
    state: Arc<Mutex<State<T, E>>>,
}

impl<F, T, E> Memoized<F, T, E> {
    /// Wrap `operation`, caching each successful result for `ttl`.
    pub fn new(operation: F, ttl: Duration) -> Self {
        Self {
            operation,
            ttl,
            state: Arc::new(Mutex::new(State {
                cache: HashMap::new(),
                pending: HashMap::new(),
            })),
        }
    }
}

impl<F, T, E> Memoized<F, T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Call the operation with `args`, reusing a cached or in-flight result for
    /// structurally equal arguments when one exists.
    pub async fn call<A, Fut>(&self, args: A) -> Result<T, MemoError<E>>
    where
        A: Serialize,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = serde_json::to_string(&args)?;

        // Cache, then pending, then a fresh invocation - all under one guard so
        // no other call can slip in between the check and the registration.
        let shared = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if let Some(value) = state.cache.get(&key) {
                trace!(%key, "cache hit");
                return Ok(value.clone());
            }
            if let Some(pending) = state.pending.get(&key) {
                trace!(%key, "joining in-flight call");
                pending.clone()
            } else {
                debug!(%key, "cache miss, invoking operation");
                let call = self.drive((self.operation)(args), key.clone());
                state.pending.insert(key, call.clone());
                // Keep the call progressing even if every caller is dropped.
                tokio::spawn(call.clone().map(|_| ()));
                call
            }
        };

        shared.await.map_err(MemoError::Operation)
    }

    /// Wrap the operation's future with settlement bookkeeping: install the
    /// cache entry and its eviction timer on success, drop the pending entry
    /// either way.
    fn drive<Fut>(&self, future: Fut, key: String) -> SharedCall<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        async move {
            match future.await {
                Ok(value) => {
                    let mut guard = state.lock().expect("state mutex poisoned");
                    guard.cache.insert(key.clone(), value.clone());
                    guard.pending.remove(&key);
                    drop(guard);

                    let evict_state = Arc::clone(&state);
                    tokio::spawn(async move {
                        tokio::time::sleep(ttl).await;
                        evict_state
                            .lock()
                            .expect("state mutex poisoned")
                            .cache
                            .remove(&key);
                        trace!(%key, "cache entry expired");
                    });
                    Ok(value)
                }
                Err(error) => {
                    state
                        .lock()
                        .expect("state mutex poisoned")
                        .pending
                        .remove(&key);
                    Err(Arc::new(error))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<F, T, E> fmt::Debug for Memoized<F, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
