use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::dispatch::{ErrorCode, GatewayError};
use crate::http::server::AppState;

/// Bearer-key gate for the admin routes. Disabled admin looks like a missing route.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let admin = state.admin.load_full();
    if !admin.enabled {
        return GatewayError::from_code(ErrorCode::ResourceNotFound).into_response();
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == admin.api_key => next.run(request).await,
        _ => GatewayError::new(ErrorCode::Unauthorized, "Invalid admin API key").into_response(),
    }
}
