//! Timeout enforcement.
//!
//! Every upstream call runs against two clocks: the per-attempt timeout
//! (the operation's nominal SLA) and the cumulative budget shared by all
//! attempts and backoff sleeps (`SLA × budget_multiplier`).

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Cumulative time budget for one logical request.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    sla: Duration,
    total: Duration,
    started: Instant,
}

impl AttemptBudget {
    pub fn start(sla: Duration, multiplier: f64) -> Self {
        Self {
            sla,
            total: sla.mul_f64(multiplier),
            started: Instant::now(),
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Timeout for the next attempt: the SLA, clipped to what is left.
    pub fn attempt_timeout(&self) -> Duration {
        self.sla.min(self.remaining())
    }

    /// Whether sleeping for `delay` would leave no time for another attempt.
    pub fn exhausted_by(&self, delay: Duration) -> bool {
        self.elapsed() + delay >= self.total
    }
}

/// Error returned when an attempt outlives its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("attempt exceeded {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline, dropping it if the deadline passes.
pub async fn with_timeout<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut).await.map_err(|_| Elapsed(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_budget_clips_attempt_timeout() {
        let budget = AttemptBudget::start(Duration::from_secs(2), 1.5);
        assert_eq!(budget.total(), Duration::from_secs(3));
        assert_eq!(budget.attempt_timeout(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(budget.attempt_timeout(), Duration::from_millis(500));
        assert!(budget.exhausted_by(Duration::from_millis(500)));
        assert!(!budget.exhausted_by(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout() {
        let slow = with_timeout(Duration::from_millis(10), tokio::time::sleep(Duration::from_secs(1)));
        assert_eq!(slow.await, Err(Elapsed(Duration::from_millis(10))));

        let fast = with_timeout(Duration::from_secs(1), async { 7 });
        assert_eq!(fast.await, Ok(7));
    }
}
