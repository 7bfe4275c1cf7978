use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::dispatch::{DispatcherStatus, GatewayError};
use crate::http::server::AppState;
use crate::security::AccountSecurityState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub dispatcher: DispatcherStatus,
}

#[derive(Serialize)]
pub struct AccountView {
    pub user_id: String,
    #[serde(flatten)]
    pub state: AccountSecurityState,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        dispatcher: state.dispatcher.status(),
    })
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.dispatcher.cache().stats())
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountView>, GatewayError> {
    let account = state.dispatcher.account(&user_id).await?;
    Ok(Json(AccountView {
        user_id,
        state: account,
    }))
}

pub async fn unlock_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.dispatcher.unlock(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
