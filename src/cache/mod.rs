//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → fingerprint.rs (canonical JSON → SHA-256)
//!     → store.rs (hit | join in-flight | start computation)
//!     → entry.rs (TTL, access bookkeeping)
//! ```
//!
//! # Design Decisions
//! - At most one computation per fingerprint; concurrent callers join it
//! - Computations run detached so an abandoned caller cannot cancel them
//! - Failures are never cached, but the previous expired value is kept for
//!   stale fallback until the retention window passes
//! - Pending entries are never evicted

pub mod entry;
pub mod fingerprint;
pub mod store;

pub use entry::CacheEntry;
pub use fingerprint::fingerprint;
pub use store::{
    CacheError, CacheLimits, CacheStats, ComputeAborted, Lookup, LookupSource, ResponseCache,
};
