//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG / config)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`user_id`, `operation`, `attempt`, `elapsed_ms`)
//!   rather than formatted messages
//! - Request ID flows through every HTTP log line via `TraceLayer`
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
