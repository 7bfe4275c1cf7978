//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body limit)
//!     → handlers.rs (decode JSON, call the dispatcher)
//!     → admin (bearer-protected inspection routes)
//!     → GatewayResponse | ErrorEnvelope
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, GatewayServer, X_REQUEST_ID};
