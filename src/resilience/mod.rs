//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Cache miss:
//!     → retries.rs (attempt loop, classify failure)
//!     → timeouts.rs (per-attempt deadline, cumulative budget)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - The cumulative budget is ~1.5× the operation SLA
//! - Only exhausted failures leave this module

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryError, RetryOrchestrator};
