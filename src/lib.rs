//! Request resilience gateway library.

pub mod admin;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use dispatch::Dispatcher;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
