//! Public route handlers.
//!
//! Every failure, including malformed JSON, leaves as the error envelope.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::{GatewayError, GatewayRequest, GatewayResponse, OperationKind};
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct OperationBody {
    pub user_id: String,
    pub payload: Value,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub user_id: String,
    pub password: String,
}

fn from_rejection(rejection: JsonRejection) -> GatewayError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::validation("request body too large")
    } else {
        GatewayError::invalid_request(rejection.body_text())
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn run_operation(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Result<Json<OperationBody>, JsonRejection>,
) -> Result<Json<GatewayResponse>, GatewayError> {
    let operation = kind
        .parse::<OperationKind>()
        .map_err(|e| GatewayError::invalid_request(e.to_string()))?;
    let Json(body) = body.map_err(from_rejection)?;

    let request = GatewayRequest::new(body.user_id, operation, body.payload).with_options(body.options);
    let response = state.dispatcher.handle(request).await?;
    Ok(Json(response))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<StatusCode, GatewayError> {
    let Json(body) = body.map_err(from_rejection)?;
    state.dispatcher.login(&body.user_id, &body.password).await?;
    Ok(StatusCode::NO_CONTENT)
}
