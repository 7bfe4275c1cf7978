//! Domain handler boundary.
//!
//! # Data Flow
//! ```text
//! Retry orchestrator
//!     → DomainHandler::compute (one attempt, bounded by the attempt timeout)
//!     → Ok(result) | Err(DomainFailure { retryable })
//! ```
//!
//! # Design Decisions
//! - The gateway never inspects payload semantics; it only forwards JSON
//! - The handler decides retryability; the orchestrator only obeys it
//! - http.rs is the production handler; tests plug in scripted ones

pub mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::request::OperationKind;

pub use self::http::HttpDomainHandler;

/// Category of a downstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The attempt did not finish in time.
    Timeout,
    /// The service is temporarily unable to answer (5xx, 429, connection reset).
    Unavailable,
    /// The payload was malformed.
    InvalidInput,
    /// The gateway's credentials were rejected.
    Unauthorized,
    /// The referenced resource does not exist.
    NotFound,
    /// The payload was well-formed but semantically rejected.
    Validation,
    /// Anything else.
    Internal,
}

impl FailureKind {
    /// Default retryability of the category.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Unavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unavailable => "unavailable",
            FailureKind::InvalidInput => "invalid input",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::NotFound => "not found",
            FailureKind::Validation => "validation",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A failed compute attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DomainFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl DomainFailure {
    /// A failure whose retryability follows its category.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_transient(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }

    /// Override the category default.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// External collaborator performing the AI-backed computation.
#[async_trait]
pub trait DomainHandler: Send + Sync + 'static {
    async fn compute(
        &self,
        operation: OperationKind,
        payload: &Value,
        options: &Value,
        timeout: Duration,
    ) -> Result<Value, DomainFailure>;
}
