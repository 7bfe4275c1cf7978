//! Error normalization.
//!
//! Every failure the gateway can produce is mapped to exactly one
//! [`ErrorCode`] and rendered as the client-facing envelope
//! `{"error": {"code", "message", "details"?, "retryAfter"?}}`.

use std::fmt;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::ComputeAborted;
use crate::resilience::RetryError;
use crate::security::LockoutError;
use crate::upstream::{DomainFailure, FailureKind};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request (missing user, unknown operation, rejected input).
    InvalidRequest,
    /// Bad credentials, or the upstream rejected the gateway's credentials.
    Unauthorized,
    /// The account is locked after repeated failed logins.
    AccountLocked,
    /// The user's token bucket is empty.
    RateLimitExceeded,
    /// The upstream kept failing after every retry.
    AiServiceUnavailable,
    /// The cumulative time budget ran out.
    RequestTimeout,
    /// The upstream reported the referenced resource missing.
    ResourceNotFound,
    /// Well-formed input that failed validation.
    ValidationError,
    /// Anything unexpected. Details are logged, never returned.
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::AccountLocked => StatusCode::LOCKED,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::AiServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::Unauthorized => "Invalid credentials",
            ErrorCode::AccountLocked => "Account is temporarily locked",
            ErrorCode::RateLimitExceeded => "Rate limit exceeded",
            ErrorCode::AiServiceUnavailable => "AI service is temporarily unavailable",
            ErrorCode::RequestTimeout => "Request timed out",
            ErrorCode::ResourceNotFound => "Resource not found",
            ErrorCode::ValidationError => "Request validation failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::AccountLocked => "ACCOUNT_LOCKED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::AiServiceUnavailable => "AI_SERVICE_UNAVAILABLE",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// GATEWAY ERROR
// ============================================================================

/// A normalized gateway failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
    pub retry_after: Option<Duration>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::from_code(ErrorCode::RateLimitExceeded)
            .with_retry_after(Duration::from_millis(retry_after_ms))
    }

    pub fn internal() -> Self {
        Self::from_code(ErrorCode::InternalError)
    }

    /// `retry_after` in whole seconds, rounded up, never zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.max(1)
        })
    }

    /// Upstream outages that may be softened by a stale cached value.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::AiServiceUnavailable | ErrorCode::RequestTimeout
        )
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message.clone(),
                details: self.details.clone(),
                retry_after: self.retry_after_secs(),
            },
        }
    }
}

impl From<ComputeAborted> for GatewayError {
    fn from(_: ComputeAborted) -> Self {
        GatewayError::internal()
    }
}

impl From<LockoutError> for GatewayError {
    fn from(err: LockoutError) -> Self {
        match err {
            LockoutError::Locked { retry_after } => {
                GatewayError::from_code(ErrorCode::AccountLocked).with_retry_after(retry_after)
            }
            LockoutError::InvalidCredentials { remaining_attempts } => {
                GatewayError::from_code(ErrorCode::Unauthorized)
                    .with_details(json!({ "remainingAttempts": remaining_attempts }))
            }
            LockoutError::Store(e) => {
                tracing::error!(error = %e, "Security state store failure");
                GatewayError::internal()
            }
        }
    }
}

/// Upstream messages stay in the logs; clients only see the code's text.
fn from_terminal(failure: &DomainFailure) -> GatewayError {
    let code = match failure.kind {
        FailureKind::InvalidInput => ErrorCode::InvalidRequest,
        FailureKind::Validation => ErrorCode::ValidationError,
        FailureKind::NotFound => ErrorCode::ResourceNotFound,
        FailureKind::Unauthorized => ErrorCode::Unauthorized,
        FailureKind::Timeout => ErrorCode::RequestTimeout,
        FailureKind::Unavailable => ErrorCode::AiServiceUnavailable,
        FailureKind::Internal => ErrorCode::InternalError,
    };
    GatewayError::from_code(code)
}

impl From<RetryError> for GatewayError {
    fn from(err: RetryError) -> Self {
        let attempts = err.attempts();
        let normalized = match &err {
            RetryError::Terminal { failure, .. } => from_terminal(failure),
            RetryError::Exhausted { .. } => {
                GatewayError::from_code(ErrorCode::AiServiceUnavailable)
            }
            RetryError::DeadlineExceeded { .. } => {
                GatewayError::from_code(ErrorCode::RequestTimeout)
            }
        };
        normalized.with_details(json!({ "attempts": attempts }))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let retry_after = self.retry_after_secs();
        let mut response = (status, Json(self.to_envelope())).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(
        rename = "retryAfter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let codes = [
            ErrorCode::InvalidRequest,
            ErrorCode::Unauthorized,
            ErrorCode::AccountLocked,
            ErrorCode::RateLimitExceeded,
            ErrorCode::AiServiceUnavailable,
            ErrorCode::RequestTimeout,
            ErrorCode::ResourceNotFound,
            ErrorCode::ValidationError,
            ErrorCode::InternalError,
        ];
        for code in codes {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }

    #[test]
    fn test_envelope_shape() {
        let err = GatewayError::rate_limited(600);
        let body = serde_json::to_value(err.to_envelope()).unwrap();
        assert_eq!(
            body,
            json!({"error": {
                "code": "RATE_LIMIT_EXCEEDED",
                "message": "Rate limit exceeded",
                "retryAfter": 1
            }})
        );

        let plain = serde_json::to_value(GatewayError::internal().to_envelope()).unwrap();
        assert!(plain["error"].get("details").is_none());
        assert!(plain["error"].get("retryAfter").is_none());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let err = GatewayError::from_code(ErrorCode::AccountLocked)
            .with_retry_after(Duration::from_millis(898_001));
        assert_eq!(err.retry_after_secs(), Some(899));
        let exact = GatewayError::rate_limited(2000);
        assert_eq!(exact.retry_after_secs(), Some(2));
    }

    #[test]
    fn test_retry_errors_normalize() {
        let exhausted = RetryError::Exhausted {
            last: DomainFailure::unavailable("503"),
            attempts: 4,
            elapsed: Duration::from_secs(7),
        };
        let err = GatewayError::from(exhausted);
        assert_eq!(err.code, ErrorCode::AiServiceUnavailable);
        assert_eq!(err.details, Some(json!({"attempts": 4})));
        assert!(err.allows_stale_fallback());

        let deadline = RetryError::DeadlineExceeded {
            last: None,
            attempts: 2,
            elapsed: Duration::from_secs(3),
            budget: Duration::from_secs(3),
        };
        assert_eq!(GatewayError::from(deadline).code, ErrorCode::RequestTimeout);

        let terminal = |kind| RetryError::Terminal {
            failure: DomainFailure::new(kind, "nope"),
            attempts: 1,
        };
        assert_eq!(
            GatewayError::from(terminal(FailureKind::NotFound)).code,
            ErrorCode::ResourceNotFound
        );
        assert_eq!(
            GatewayError::from(terminal(FailureKind::Validation)).code,
            ErrorCode::ValidationError
        );
        let invalid = GatewayError::from(terminal(FailureKind::InvalidInput));
        assert_eq!(invalid.code, ErrorCode::InvalidRequest);
        assert_eq!(invalid.message, "Invalid request");
        assert!(!GatewayError::from(terminal(FailureKind::Internal)).allows_stale_fallback());
    }

    #[test]
    fn test_lockout_errors_normalize() {
        let locked = GatewayError::from(LockoutError::Locked {
            retry_after: Duration::from_secs(900),
        });
        assert_eq!(locked.code, ErrorCode::AccountLocked);
        assert_eq!(locked.code.status_code(), StatusCode::LOCKED);
        assert_eq!(locked.retry_after_secs(), Some(900));

        let invalid = GatewayError::from(LockoutError::InvalidCredentials {
            remaining_attempts: 2,
        });
        assert_eq!(invalid.code, ErrorCode::Unauthorized);
    }

    #[test]
    fn test_into_response_sets_retry_after_header() {
        let response = GatewayError::rate_limited(600).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            HeaderValue::from_static("1")
        );
    }
}
