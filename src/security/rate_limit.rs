//! Per-user token bucket admission control.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::AdmissionConfig;
use crate::observability::metrics;

/// A token bucket that refills lazily on access.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Admission {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens; also clamps buckets after a capacity reduction.
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Allowed
        } else {
            // Denied requests leave the bucket untouched.
            let wait_ms = ((1.0 - self.tokens) / refill_rate * 1000.0).ceil();
            Admission::Denied {
                retry_after_ms: (wait_ms as u64).max(1),
            }
        }
    }

    /// True once the bucket has refilled to capacity and sat untouched for
    /// `idle`; dropping it then is indistinguishable from keeping it.
    fn is_idle(&self, now: Instant, capacity: f64, refill_rate: f64, idle: Duration) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update);
        elapsed >= idle && self.tokens + elapsed.as_secs_f64() * refill_rate >= capacity
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after_ms: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Per-user token bucket store.
///
/// Buckets live in a `DashMap` of individually locked cells, so one user's
/// refill-and-consume is atomic while other users proceed in parallel.
pub struct AdmissionController {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
    config: ArcSwap<AdmissionConfig>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Try to take one token from `user_id`'s bucket.
    pub fn try_acquire(&self, user_id: &str) -> Admission {
        let config = self.config.load();
        if !config.enabled {
            return Admission::Allowed;
        }
        let capacity = config.capacity as f64;

        // Clone the cell out so the shard lock is released before the bucket lock.
        let cell = match self.buckets.get(user_id) {
            Some(cell) => cell.value().clone(),
            None => self
                .buckets
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(capacity))))
                .value()
                .clone(),
        };

        let decision = cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(capacity, config.refill_per_second);

        match decision {
            Admission::Allowed => metrics::record_admission(true),
            Admission::Denied { retry_after_ms } => {
                tracing::warn!(user_id = %user_id, retry_after_ms, "Rate limit exceeded");
                metrics::record_admission(false);
            }
        }
        decision
    }

    /// Swap in new capacity / refill settings.
    pub fn reconfigure(&self, config: AdmissionConfig) {
        self.config.store(Arc::new(config));
    }

    /// Number of users with a bucket.
    pub fn tracked_users(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that are full and idle. Returns how many were removed.
    ///
    /// A bucket still referenced by an in-flight `try_acquire` is kept.
    pub fn sweep_idle(&self) -> usize {
        let config = self.config.load();
        let capacity = config.capacity as f64;
        let idle = config.idle_eviction();
        let now = Instant::now();
        let before = self.buckets.len();

        self.buckets.retain(|_, cell| match Arc::get_mut(cell) {
            Some(bucket) => !bucket
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .is_idle(now, capacity, config.refill_per_second, idle),
            None => true,
        });
        before.saturating_sub(self.buckets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(capacity: u32, refill_per_second: f64) -> AdmissionController {
        AdmissionController::new(AdmissionConfig {
            capacity,
            refill_per_second,
            ..AdmissionConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_deny_with_retry_after() {
        let limiter = AdmissionController::new(AdmissionConfig::default());

        for i in 0..100 {
            assert!(limiter.try_acquire("alice").is_allowed(), "request {} denied", i);
        }

        match limiter.try_acquire("alice") {
            Admission::Denied { retry_after_ms } => {
                assert!((599..=601).contains(&retry_after_ms), "{}", retry_after_ms)
            }
            Admission::Allowed => panic!("101st request admitted"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_capacity_in_window() {
        let limiter = AdmissionController::new(AdmissionConfig::default());

        // 200 requests spread over 59 seconds: 100 burst + ~98 refilled.
        let mut admitted = 0;
        for _ in 0..200 {
            if limiter.try_acquire("bob").is_allowed() {
                admitted += 1;
            }
            tokio::time::advance(Duration::from_millis(295)).await;
        }
        assert!(admitted <= 100 + 99, "admitted {}", admitted);

        // A fresh burst inside one instant never exceeds capacity.
        let limiter = controller(100, 100.0 / 60.0);
        let admitted = (0..500).filter(|_| limiter.try_acquire("carol").is_allowed()).count();
        assert_eq!(admitted, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_requests_do_not_consume() {
        let limiter = controller(1, 1.0);
        assert!(limiter.try_acquire("u").is_allowed());

        for _ in 0..10 {
            assert!(!limiter.try_acquire("u").is_allowed());
        }

        // One second refills exactly one token regardless of the denials above.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire("u").is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped() {
        let limiter = controller(5, 10.0);
        tokio::time::advance(Duration::from_secs(3600)).await;

        let admitted = (0..20).filter(|_| limiter.try_acquire("u").is_allowed()).count();
        assert_eq!(admitted, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let limiter = controller(2, 1.0);
        assert!(limiter.try_acquire("a").is_allowed());
        assert!(limiter.try_acquire("a").is_allowed());
        assert!(!limiter.try_acquire("a").is_allowed());

        assert!(limiter.try_acquire("b").is_allowed());
        assert_eq!(limiter.tracked_users(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_clamps_existing_buckets() {
        let limiter = controller(100, 1.0);
        assert!(limiter.try_acquire("u").is_allowed());

        limiter.reconfigure(AdmissionConfig {
            capacity: 2,
            refill_per_second: 1.0,
            ..AdmissionConfig::default()
        });
        let admitted = (0..10).filter(|_| limiter.try_acquire("u").is_allowed()).count();
        assert_eq!(admitted, 2);
    }

    #[test]
    fn test_disabled_always_allows() {
        let limiter = AdmissionController::new(AdmissionConfig {
            enabled: false,
            capacity: 1,
            refill_per_second: 0.001,
            ..AdmissionConfig::default()
        });
        assert!((0..10).all(|_| limiter.try_acquire("u").is_allowed()));
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_full_idle_buckets() {
        let limiter = AdmissionController::new(AdmissionConfig {
            capacity: 10,
            refill_per_second: 0.1,
            idle_eviction_secs: 60,
            ..AdmissionConfig::default()
        });
        for i in 0..1000 {
            assert!(limiter.try_acquire(&format!("user-{}", i)).is_allowed());
        }
        let drained = (0..10).filter(|_| limiter.try_acquire("heavy").is_allowed()).count();
        assert_eq!(drained, 10);
        assert_eq!(limiter.tracked_users(), 1001);

        // Full again after 10s, but not idle for the window yet.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.sweep_idle(), 0);

        // Light users are full and idle; "heavy" has refilled 6.5 of 10.
        tokio::time::advance(Duration::from_secs(35)).await;
        assert_eq!(limiter.sweep_idle(), 1000);
        assert_eq!(limiter.tracked_users(), 1);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(limiter.sweep_idle(), 1);
        assert_eq!(limiter.tracked_users(), 0);

        // A recreated bucket starts full, exactly like the dropped one.
        let admitted = (0..20).filter(|_| limiter.try_acquire("heavy").is_allowed()).count();
        assert_eq!(admitted, 10);
    }
}
