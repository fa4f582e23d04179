//! In-memory response cache with single-flight de-duplication.
//!
//! Each key is either a stored value with an expiry or an in-flight
//! computation. Callers arriving while a computation runs subscribe to its
//! result instead of starting their own. Computations run on their own task,
//! so a caller that stops waiting does not cancel the work other callers share.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::model::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Kind of upstream operation a cache entry belongs to.
pub enum Operation {
    /// Address suggestion search.
    Search,
    /// Schedule lookup.
    Schedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Cache key: operation, provider, and the normalized query or provider address id.
pub struct CacheKey {
    /// Operation kind.
    pub operation: Operation,
    /// Provider the value came from.
    pub provider: ProviderId,
    /// Normalized query text or provider address id.
    pub subject: String,
}

impl CacheKey {
    /// Build a key.
    #[must_use]
    pub fn new<S: Into<String>>(operation: Operation, provider: ProviderId, subject: S) -> Self {
        Self {
            operation,
            provider,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{:?}:{}:{}",
            self.operation, self.provider, self.subject
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Snapshot of cache occupancy.
pub struct CacheStats {
    /// Stored values, expired or not.
    pub total_entries: usize,
    /// Stored values that have not expired.
    pub active_entries: usize,
    /// Stored values past their expiry that have not been purged yet.
    pub expired_entries: usize,
    /// Computations currently running.
    pub in_flight: usize,
}

type Shared<V, E> = Option<Result<V, E>>;

enum Slot<V, E> {
    // `None` never expires.
    Ready {
        value: V,
        expires_at: Option<Instant>,
    },
    InFlight {
        flight: u64,
        receiver: watch::Receiver<Shared<V, E>>,
    },
}

enum Claim<V, E> {
    Hit(V),
    Wait(watch::Receiver<Shared<V, E>>),
    Lead {
        flight: u64,
        sender: watch::Sender<Shared<V, E>>,
    },
}

type Slots<V, E> = Mutex<HashMap<CacheKey, Slot<V, E>>>;

/// Thread-safe single-flight cache.
///
/// Cloning is cheap and every clone shares the same entries.
pub struct SingleFlightCache<V, E> {
    slots: Arc<Slots<V, E>>,
    next_flight: Arc<AtomicU64>,
}

impl<V, E> Clone for SingleFlightCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            next_flight: Arc::clone(&self.next_flight),
        }
    }
}

impl<V, E> Default for SingleFlightCache<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for SingleFlightCache<V, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SingleFlightCache")
            .field("entries", &lock(&self.slots).len())
            .finish()
    }
}

impl<V, E> SingleFlightCache<V, E> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop stored values whose expiry has passed.
    pub fn purge_expired(&self) {
        purge(&self.slots);
    }

    /// Remove every stored value. Running computations are left alone.
    pub fn clear(&self) {
        lock(&self.slots).retain(|_, slot| matches!(slot, Slot::InFlight { .. }));
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let slots = lock(&self.slots);
        let mut stats = CacheStats::default();
        for slot in slots.values() {
            match slot {
                Slot::Ready { expires_at, .. } => {
                    stats.total_entries += 1;
                    if fresh(*expires_at, now) {
                        stats.active_entries += 1;
                    } else {
                        stats.expired_entries += 1;
                    }
                }
                Slot::InFlight { .. } => stats.in_flight += 1,
            }
        }
        stats
    }
}

impl<V, E> SingleFlightCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Return the stored value for `key`, or compute it exactly once.
    ///
    /// Successful results are stored for `ttl`; a zero `ttl` shares the result
    /// with concurrent callers but stores nothing, and a `ttl` too large to
    /// represent as a deadline never expires. Errors are handed to every
    /// caller waiting on that computation and are never stored.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `compute`, either from this caller's own
    /// computation or from the one it joined.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from `compute` in the caller that started it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        loop {
            let mut receiver = match self.claim(key) {
                Claim::Hit(value) => {
                    debug!(%key, "cache hit");
                    return Ok(value);
                }
                Claim::Wait(receiver) => {
                    debug!(%key, "joining in-flight computation");
                    receiver
                }
                Claim::Lead { flight, sender } => {
                    debug!(%key, "cache miss");
                    return self.lead(key.clone(), ttl, flight, sender, compute()).await;
                }
            };

            if let Ok(shared) = receiver.wait_for(Option::is_some).await
                && let Some(result) = shared.as_ref()
            {
                return result.clone();
            }
            debug!(%key, "in-flight computation ended without a result, retrying");
        }
    }

    /// Spawn a task that purges expired values every `period`.
    ///
    /// The task stops once every handle to the cache has been dropped.
    #[must_use]
    pub fn spawn_purge_task(&self, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Slots<V, E>> = Arc::downgrade(&self.slots);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(slots) = weak.upgrade() else {
                    break;
                };
                purge(&slots);
            }
        })
    }

    fn claim(&self, key: &CacheKey) -> Claim<V, E> {
        let mut slots = lock(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready { value, expires_at }) if fresh(*expires_at, Instant::now()) => {
                return Claim::Hit(value.clone());
            }
            // A closed channel means the computing task died before publishing.
            Some(Slot::InFlight { receiver, .. }) if receiver.has_changed().is_ok() => {
                return Claim::Wait(receiver.clone());
            }
            _ => {}
        }

        let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        slots.insert(key.clone(), Slot::InFlight { flight, receiver });
        Claim::Lead { flight, sender }
    }

    async fn lead<Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        flight: u64,
        sender: watch::Sender<Shared<V, E>>,
        computation: Fut,
    ) -> Result<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let handle = tokio::spawn(async move {
            let result = computation.await;
            {
                let mut guard = lock(&slots);
                let owns_slot = matches!(
                    guard.get(&key),
                    Some(Slot::InFlight { flight: current, .. }) if *current == flight
                );
                if owns_slot {
                    match &result {
                        Ok(value) if !ttl.is_zero() => {
                            guard.insert(
                                key,
                                Slot::Ready {
                                    value: value.clone(),
                                    expires_at: Instant::now().checked_add(ttl),
                                },
                            );
                        }
                        _ => {
                            guard.remove(&key);
                        }
                    }
                }
            }
            sender.send_replace(Some(result.clone()));
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => std::panic::resume_unwind(
                join_error
                    .try_into_panic()
                    .unwrap_or_else(|cancelled| -> Box<dyn Any + Send> {
                        Box::new(cancelled.to_string())
                    }),
            ),
        }
    }
}

fn purge<V, E>(slots: &Slots<V, E>) {
    let now = Instant::now();
    lock(slots).retain(|_, slot| match slot {
        Slot::Ready { expires_at, .. } => fresh(*expires_at, now),
        Slot::InFlight { .. } => true,
    });
}

fn fresh(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_none_or(|at| at > now)
}

fn lock<V, E>(slots: &Slots<V, E>) -> MutexGuard<'_, HashMap<CacheKey, Slot<V, E>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
