//! HTTP domain handler.
//!
//! Forwards each attempt as `POST {operation, payload, options}` to the
//! configured AI service and classifies the outcome for the retry loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::dispatch::request::OperationKind;
use crate::upstream::{DomainFailure, DomainHandler, FailureKind};

pub struct HttpDomainHandler {
    client: reqwest::Client,
    url: url::Url,
    api_key: Option<String>,
}

impl HttpDomainHandler {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamInitError> {
        let url = url::Url::parse(&config.url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamInitError {
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Map an upstream status to a failure category.
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::BAD_REQUEST => FailureKind::InvalidInput,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Unauthorized,
        StatusCode::NOT_FOUND => FailureKind::NotFound,
        StatusCode::UNPROCESSABLE_ENTITY => FailureKind::Validation,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FailureKind::Timeout,
        StatusCode::TOO_MANY_REQUESTS => FailureKind::Unavailable,
        s if s.is_server_error() => FailureKind::Unavailable,
        _ => FailureKind::Internal,
    }
}

fn classify_transport(err: &reqwest::Error) -> DomainFailure {
    if err.is_timeout() {
        DomainFailure::timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        DomainFailure::unavailable(err.to_string())
    } else {
        // Body decode errors and the like will not improve on retry.
        DomainFailure::new(FailureKind::Internal, err.to_string())
    }
}

#[async_trait]
impl DomainHandler for HttpDomainHandler {
    async fn compute(
        &self,
        operation: OperationKind,
        payload: &Value,
        options: &Value,
        timeout: Duration,
    ) -> Result<Value, DomainFailure> {
        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(timeout)
            .json(&json!({
                "operation": operation,
                "payload": payload,
                "options": options,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();

        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| classify_transport(&e));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(operation = %operation, status = %status, "Upstream returned error status");
        Err(DomainFailure::new(
            classify_status(status),
            format!("upstream returned {}: {}", status, body),
        ))
    }
}
