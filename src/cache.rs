//! In-process memoization for resolver lookups.
//!
//! [`ResolverCache::get_or_set`] guarantees that at most one computation per
//! key is in flight. Computations run as detached tokio tasks, so a caller
//! that stops waiting never cancels work other callers are waiting on.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use moka::sync::Cache;
use moka::Expiry;
use tracing::{debug, trace};

use crate::error::ResolveError;

type CacheValue = Arc<dyn Any + Send + Sync>;
type Flight = Shared<BoxFuture<'static, Result<CacheValue, ResolveError>>>;

/// Per-resolver caching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lifetime of a successful result.
    pub ttl: Duration,
    /// Lifetime of a [`ResolveError::NotFound`] result. `None` disables
    /// negative caching and every lookup of a missing resource hits the
    /// network again.
    pub not_found_ttl: Option<Duration>,
}

impl CachePolicy {
    #[must_use]
    pub const fn positive_only(ttl: Duration) -> Self {
        Self {
            ttl,
            not_found_ttl: None,
        }
    }

    #[must_use]
    pub const fn with_not_found(ttl: Duration, not_found_ttl: Duration) -> Self {
        Self {
            ttl,
            not_found_ttl: Some(not_found_ttl),
        }
    }

    /// TTL to store `outcome` with, or `None` if it must not be stored.
    fn ttl_for(&self, outcome: &Result<CacheValue, ResolveError>) -> Option<Duration> {
        match outcome {
            Ok(_) => Some(self.ttl),
            Err(ResolveError::NotFound) => self.not_found_ttl,
            Err(_) => None,
        }
    }
}

#[derive(Clone)]
struct Entry {
    outcome: Result<CacheValue, ResolveError>,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

struct Inner {
    entries: Cache<String, Entry>,
    in_flight: Mutex<HashMap<String, Flight>>,
}

/// Shared, cloneable resolver cache.
#[derive(Clone)]
pub struct ResolverCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResolverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverCache")
            .field("entries", &self.inner.entries.entry_count())
            .finish_non_exhaustive()
    }
}

impl ResolverCache {
    /// Create a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self {
            inner: Arc::new(Inner {
                entries,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the cached value for `key`, computing it with `compute` if it
    /// is absent.
    ///
    /// Concurrent callers for the same key share one invocation of
    /// `compute` and all observe its outcome. Failures other than a
    /// not-found permitted by `policy` are never stored.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `compute`, or a cached not-found.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        compute: F,
    ) -> Result<Arc<T>, ResolveError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            // Completed computations publish their entry before leaving the
            // in-flight table, so checking under the lock cannot miss both.
            if let Some(entry) = self.inner.entries.get(key) {
                trace!(key = %key, "Resolver cache hit");
                return downcast(key, entry.outcome);
            }

            if let Some(flight) = in_flight.get(key) {
                trace!(key = %key, "Joining in-flight computation");
                flight.clone()
            } else {
                debug!(key = %key, "Resolver cache miss");
                let flight = self.spawn(key.to_string(), policy, compute());
                in_flight.insert(key.to_string(), flight.clone());
                flight
            }
        };

        downcast(key, flight.await)
    }

    fn spawn<T, Fut>(&self, key: String, policy: CachePolicy, fut: Fut) -> Flight
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            // A panic must still reach the bookkeeping below, or the key
            // would stay in flight forever.
            let outcome = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ResolveError::Unknown(panic_message(&*panic))))
                .map(|value| Arc::new(value) as CacheValue);

            if let Some(ttl) = policy.ttl_for(&outcome) {
                inner.entries.insert(
                    key.clone(),
                    Entry {
                        outcome: outcome.clone(),
                        ttl,
                    },
                );
            }
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);

            outcome
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(ResolveError::Unknown(format!(
                    "cache computation did not complete: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of stored entries. Approximate while writes are pending.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entries.run_pending_tasks();
        self.inner.entries.entry_count()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(
            || "cache computation panicked".to_string(),
            |message| format!("cache computation panicked: {message}"),
        )
}

fn downcast<T>(key: &str, outcome: Result<CacheValue, ResolveError>) -> Result<Arc<T>, ResolveError>
where
    T: Send + Sync + 'static,
{
    outcome?.downcast::<T>().map_err(|_| {
        ResolveError::Unknown(format!("resolver cache entry '{key}' has an unexpected type"))
    })
}
