//! Retry orchestration.
//!
//! # Responsibilities
//! - Run one logical upstream call as a sequence of bounded attempts
//! - Retry retryable failures with exponential backoff + jitter
//! - Stop early when the cumulative budget would be crossed
//!
//! # Design Decisions
//! - Terminal failures (input, auth, not found) are never retried
//! - A timed-out attempt counts as a retryable failure
//! - Jittered backoff prevents thundering herd

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::{with_timeout, AttemptBudget};
use crate::upstream::DomainFailure;

/// Why a logical call failed after the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// A non-retryable failure; propagated immediately.
    #[error("upstream rejected the request: {failure}")]
    Terminal { failure: DomainFailure, attempts: u32 },

    /// Every allowed attempt failed with a retryable failure.
    #[error("upstream unavailable after {attempts} attempts: {last}")]
    Exhausted {
        last: DomainFailure,
        attempts: u32,
        elapsed: Duration,
    },

    /// The cumulative budget ran out before the retries did.
    #[error("upstream did not answer within {budget:?} ({attempts} attempts)")]
    DeadlineExceeded {
        last: Option<DomainFailure>,
        attempts: u32,
        elapsed: Duration,
        budget: Duration,
    },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Terminal { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }
}

/// Bounded exponential retry around a fallible async operation.
pub struct RetryOrchestrator {
    config: ArcSwap<RetryConfig>,
}

impl RetryOrchestrator {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    pub fn reconfigure(&self, config: RetryConfig) {
        self.config.store(Arc::new(config));
    }

    /// Run `operation` until it succeeds, fails terminally, runs out of
    /// retries, or would overrun `sla × budget_multiplier`.
    ///
    /// `operation` receives the timeout of the attempt it is running.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        sla: Duration,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, DomainFailure>>,
    {
        let config = self.config.load_full();
        let max_retries = if config.enabled { config.max_retries } else { 0 };
        let budget = AttemptBudget::start(sla, config.budget_multiplier);
        let mut attempts = 0u32;
        let mut last = None;

        loop {
            let timeout = budget.attempt_timeout();
            if timeout.is_zero() {
                return Err(RetryError::DeadlineExceeded {
                    last,
                    attempts,
                    elapsed: budget.elapsed(),
                    budget: budget.total(),
                });
            }

            attempts += 1;
            let outcome = match with_timeout(timeout, operation(timeout)).await {
                Ok(result) => result,
                Err(elapsed) => Err(DomainFailure::timeout(elapsed.to_string())),
            };

            let failure = match outcome {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(
                            operation = %label,
                            attempts,
                            elapsed_ms = budget.elapsed().as_millis() as u64,
                            "Upstream recovered after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) if !failure.retryable => {
                    return Err(RetryError::Terminal { failure, attempts });
                }
                Err(failure) => failure,
            };

            let retry = attempts - 1;
            if retry >= max_retries {
                return Err(RetryError::Exhausted {
                    last: failure,
                    attempts,
                    elapsed: budget.elapsed(),
                });
            }

            let delay = calculate_backoff(
                retry,
                config.base_delay_ms,
                config.max_delay_ms,
                config.jitter_ratio,
            );
            if budget.exhausted_by(delay) {
                tracing::warn!(
                    operation = %label,
                    attempts,
                    budget_ms = budget.total().as_millis() as u64,
                    "Retry budget exhausted"
                );
                return Err(RetryError::DeadlineExceeded {
                    last: Some(failure),
                    attempts,
                    elapsed: budget.elapsed(),
                    budget: budget.total(),
                });
            }

            tracing::info!(
                operation = %label,
                attempt = attempts,
                delay = ?delay,
                error = %failure,
                "Retrying upstream call"
            );
            metrics::record_retry(label);
            last = Some(failure);
            tokio::time::sleep(delay).await;
        }
    }
}
