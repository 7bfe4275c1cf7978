//! Administrative inspection routes.
//!
//! All routes require `Authorization: Bearer <admin.api_key>` and answer
//! 404 while `admin.enabled` is false.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/accounts/{id}", get(get_account))
        .route("/admin/accounts/{id}/unlock", post(unlock_account))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
