//! Cache entries and the per-key slot state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// A fully computed value with its freshness bookkeeping.
///
/// Only the access counters mutate after construction, so an entry is never
/// observable half-written.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    ttl: Duration,
    access_count: AtomicU64,
    /// Nanoseconds after `created_at` of the most recent read.
    last_access_offset: AtomicU64,
}

impl<V> CacheEntry<V> {
    pub fn new(value: Arc<V>, created_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            created_at,
            ttl,
            access_count: AtomicU64::new(0),
            last_access_offset: AtomicU64::new(0),
        }
    }

    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn expires_at(&self) -> Instant {
        self.created_at + self.ttl
    }

    /// Expired strictly after `created_at + ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at()
    }

    /// Expired for longer than `retention`.
    pub fn is_expired_beyond(&self, now: Instant, retention: Duration) -> bool {
        now > self.expires_at() + retention
    }

    pub fn touch(&self, now: Instant) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        let offset = now.saturating_duration_since(self.created_at).as_nanos() as u64;
        self.last_access_offset.fetch_max(offset, Ordering::Relaxed);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_access_offset.load(Ordering::Relaxed))
    }
}

/// Result shared by every waiter of one computation.
pub(crate) type Outcome<V, E> = Result<Arc<V>, E>;

/// Rendezvous for an in-flight computation.
pub(crate) struct Pending<V, E> {
    /// Distinguishes this computation from a later one on the same key.
    pub(crate) id: u64,
    pub(crate) rx: watch::Receiver<Option<Outcome<V, E>>>,
    /// The expired entry this computation replaces, kept for stale fallback.
    pub(crate) stale: Option<Arc<CacheEntry<V>>>,
}

/// State of one fingerprint.
pub(crate) enum Slot<V, E> {
    Ready(Arc<CacheEntry<V>>),
    Pending(Pending<V, E>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary() {
        let now = Instant::now();
        let entry = CacheEntry::new(Arc::new(1), now, Duration::from_secs(300));

        assert!(!entry.is_expired(now + Duration::from_secs(299)));
        assert!(!entry.is_expired(now + Duration::from_secs(300)));
        assert!(entry.is_expired(now + Duration::from_secs(301)));
        assert!(!entry.is_expired_beyond(now + Duration::from_secs(301), Duration::from_secs(60)));
        assert!(entry.is_expired_beyond(now + Duration::from_secs(361), Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_tracks_latest_access() {
        let now = Instant::now();
        let entry = CacheEntry::new(Arc::new("v"), now, Duration::from_secs(10));
        assert_eq!(entry.last_accessed_at(), now);

        entry.touch(now + Duration::from_secs(5));
        entry.touch(now + Duration::from_secs(3));
        assert_eq!(entry.access_count(), 2);
        assert_eq!(entry.last_accessed_at(), now + Duration::from_secs(5));
    }
}
