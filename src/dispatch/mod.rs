//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! GatewayRequest
//!     → validation (user id, payload shape and size)
//!     → security::lockout (account locked?)
//!     → security::rate_limit (token available?)
//!     → cache::store (hit | join | compute)
//!         → resilience::retries → upstream::DomainHandler
//!     → GatewayResponse | errors.rs (GatewayError → ErrorEnvelope)
//! ```
//!
//! # Design Decisions
//! - Checks run cheapest first and stop at the first failure
//! - A denied or locked request never reaches the cache or the upstream
//! - Exhausted upstream failures fall back to a stale value when one exists

pub mod dispatcher;
pub mod errors;
pub mod request;

pub use dispatcher::{Collaborators, Dispatcher, DispatcherStatus, SweepReport};
pub use errors::{ErrorBody, ErrorCode, ErrorEnvelope, GatewayError};
pub use request::{GatewayRequest, GatewayResponse, OperationKind, UnknownOperation};
