//! Single-flight response cache.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cache::entry::{CacheEntry, Outcome, Pending, Slot};
use crate::observability::metrics;

/// Raised to waiters when a computation dies without producing an outcome
/// (panic, runtime shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cache computation aborted")]
pub struct ComputeAborted;

/// Where a successful lookup's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Unexpired entry.
    Hit,
    /// This caller started the computation.
    Computed,
    /// This caller waited on another caller's computation.
    Joined,
    /// Expired entry served because the computation failed.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: Arc<V>,
    pub source: LookupSource,
}

/// A failed computation, identical for every waiter on it.
#[derive(Debug, Clone)]
pub struct CacheError<V, E> {
    pub error: E,
    /// Expired value for the same fingerprint, if one was still held.
    pub stale: Option<Arc<V>>,
}

/// Runtime-adjustable cache bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: Option<usize>,
    pub stale_retention: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: None,
            stale_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub pending: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    evictions: AtomicU64,
}

enum Occupant<V, E> {
    Expired(Arc<CacheEntry<V>>),
    InFlight(watch::Receiver<Option<Outcome<V, E>>>, Option<Arc<V>>),
}

enum Role<V, E> {
    Leader {
        id: u64,
        tx: watch::Sender<Option<Outcome<V, E>>>,
    },
    Follower,
}

/// TTL-bounded cache with at most one in-flight computation per key.
///
/// Must be held in an `Arc`: computations run in spawned tasks that outlive
/// the caller that started them.
pub struct ResponseCache<V, E> {
    slots: DashMap<String, Slot<V, E>>,
    limits: ArcSwap<CacheLimits>,
    counters: Counters,
    next_id: AtomicU64,
}

impl<V, E> ResponseCache<V, E>
where
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + From<ComputeAborted> + 'static,
{
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            slots: DashMap::new(),
            limits: ArcSwap::from_pointee(limits),
            counters: Counters::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the cached value for `key`, or run `compute` once for every
    /// concurrent caller and cache its success for `ttl`.
    ///
    /// Dropping the returned future abandons only this caller's wait; the
    /// computation still completes for the others.
    pub async fn get_or_compute<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Lookup<V>, CacheError<V, E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let now = Instant::now();

        let (role, mut rx, stale) = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let occupant = match occupied.get() {
                    Slot::Ready(entry) if !entry.is_expired(now) => {
                        entry.touch(now);
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        metrics::record_cache_lookup("hit");
                        return Ok(Lookup {
                            value: entry.value().clone(),
                            source: LookupSource::Hit,
                        });
                    }
                    Slot::Ready(expired) => Occupant::Expired(Arc::clone(expired)),
                    Slot::Pending(pending) => Occupant::InFlight(
                        pending.rx.clone(),
                        pending.stale.as_ref().map(|e| e.value().clone()),
                    ),
                };

                match occupant {
                    Occupant::InFlight(rx, stale) => {
                        self.counters.joins.fetch_add(1, Ordering::Relaxed);
                        metrics::record_cache_lookup("join");
                        (Role::Follower, rx, stale)
                    }
                    Occupant::Expired(expired) => {
                        let stale = Some(expired.value().clone());
                        let (id, tx, rx) = self.open_pending();
                        occupied.insert(Slot::Pending(Pending {
                            id,
                            rx: rx.clone(),
                            stale: Some(expired),
                        }));
                        (Role::Leader { id, tx }, rx, stale)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (id, tx, rx) = self.open_pending();
                vacant.insert(Slot::Pending(Pending {
                    id,
                    rx: rx.clone(),
                    stale: None,
                }));
                (Role::Leader { id, tx }, rx, None)
            }
        };

        let source = match role {
            Role::Leader { id, tx } => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("miss");
                self.spawn_computation(key.to_string(), id, ttl, tx, compute());
                LookupSource::Computed
            }
            Role::Follower => LookupSource::Joined,
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
        .unwrap_or_else(|| Err(E::from(ComputeAborted)));

        match outcome {
            Ok(value) => Ok(Lookup { value, source }),
            Err(error) => Err(CacheError { error, stale }),
        }
    }

    fn open_pending(
        &self,
    ) -> (
        u64,
        watch::Sender<Option<Outcome<V, E>>>,
        watch::Receiver<Option<Outcome<V, E>>>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        (id, tx, rx)
    }

    fn spawn_computation<Fut>(
        self: &Arc<Self>,
        key: String,
        id: u64,
        ttl: Duration,
        tx: watch::Sender<Option<Outcome<V, E>>>,
        fut: Fut,
    ) where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        // The inner task isolates panics: a panicking computation surfaces as
        // a JoinError here instead of leaving the slot pending forever.
        let work = tokio::spawn(fut);
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match work.await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(error)) => Err(error),
                Err(join_error) => {
                    tracing::error!(fingerprint = %key, error = %join_error, "Cache computation aborted");
                    Err(E::from(ComputeAborted))
                }
            };
            cache.settle(&key, id, ttl, &outcome);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Publish a finished computation into the slot it was started for.
    fn settle(&self, key: &str, id: u64, ttl: Duration, outcome: &Outcome<V, E>) {
        let stored = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stale = match occupied.get() {
                    Slot::Pending(pending) if pending.id == id => pending.stale.clone(),
                    // Invalidated or superseded while computing.
                    _ => return,
                };
                match outcome {
                    Ok(value) => {
                        let entry = CacheEntry::new(value.clone(), Instant::now(), ttl);
                        occupied.insert(Slot::Ready(Arc::new(entry)));
                        true
                    }
                    Err(_) => {
                        // Failures are not cached; keep only the older stale value.
                        match stale {
                            Some(previous) => {
                                occupied.insert(Slot::Ready(previous));
                            }
                            None => {
                                occupied.remove();
                            }
                        }
                        false
                    }
                }
            }
            Entry::Vacant(_) => return,
        };

        if stored {
            self.enforce_capacity();
        }
    }

    /// Evict non-pending entries until within `max_entries`: already-expired
    /// entries first, then least recently accessed.
    ///
    /// One scan per call, O(n) in the number of slots, however many entries
    /// go. Pending slots count toward the bound but are never chosen, so a
    /// cache full of in-flight computations can exceed it until they settle.
    fn enforce_capacity(&self) {
        let Some(max) = self.limits.load().max_entries else {
            return;
        };
        let excess = self.slots.len().saturating_sub(max);
        if excess == 0 {
            return;
        }
        let now = Instant::now();

        let mut victims: Vec<_> = self
            .slots
            .iter()
            .filter_map(|r| match r.value() {
                Slot::Ready(entry) => Some((
                    r.key().clone(),
                    Arc::clone(entry),
                    !entry.is_expired(now),
                    entry.last_accessed_at(),
                )),
                Slot::Pending(_) => None,
            })
            .collect();
        if victims.len() > excess {
            victims.select_nth_unstable_by_key(excess - 1, |(_, _, fresh, last)| (*fresh, *last));
            victims.truncate(excess);
        }

        for (key, entry, _, _) in victims {
            let removed = self.slots.remove_if(&key, |_, slot| {
                matches!(slot, Slot::Ready(current) if Arc::ptr_eq(current, &entry))
            });
            if removed.is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("eviction");
                tracing::debug!(fingerprint = %key, "Evicted cache entry");
            }
        }
    }

    /// Drop a ready entry. Pending computations are left alone.
    pub fn invalidate(&self, key: &str) -> bool {
        self.slots
            .remove_if(key, |_, slot| matches!(slot, Slot::Ready(_)))
            .is_some()
    }

    /// Remove entries expired for longer than the stale-retention window.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let retention = self.limits.load().stale_retention;
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => !entry.is_expired_beyond(now, retention),
            Slot::Pending(_) => true,
        });
        before.saturating_sub(self.slots.len())
    }

    pub fn reconfigure(&self, limits: CacheLimits) {
        self.limits.store(Arc::new(limits));
        self.enforce_capacity();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let pending = self
            .slots
            .iter()
            .filter(|r| matches!(r.value(), Slot::Pending(_)))
            .count();
        CacheStats {
            entries: self.slots.len(),
            pending,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            joins: self.counters.joins.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
