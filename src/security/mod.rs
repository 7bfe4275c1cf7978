//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → lockout.rs (reject locked accounts)
//!     → rate_limit.rs (per-user token bucket)
//!     → Pass to cache / compute
//!
//! Login:
//!     → lockout.rs (serialize per account, lazy unlock)
//!     → credentials.rs (verify password)
//!     → store.rs (persist the new state)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Keyed stores with per-key locks; users never contend with each other
//! - Both checks are in-memory; only the optional store does I/O

pub mod credentials;
pub mod lockout;
pub mod rate_limit;
pub mod store;

pub use credentials::{CredentialVerifier, StaticCredentials};
pub use lockout::{AccountSecurityState, AccountStatus, LockoutError, LockoutStateMachine};
pub use rate_limit::{Admission, AdmissionController};
pub use store::{JsonFileStore, NullStore, SecurityStateStore, StoreError};
