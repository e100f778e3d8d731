//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::api::middleware::Authorized;
use crate::api::server::AppState;
use crate::models::PoolStats;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "inventory-relay"
        })),
    )
}

/// Pool and fetch settings snapshot
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub pool: PoolStats,
    pub selection_policy: &'static str,
    pub max_attempts: u32,
    pub uptime_secs: u64,
}

/// Status endpoint (requires the token)
pub async fn status(_auth: Authorized, State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        pool: state.fetcher.pool().stats(),
        selection_policy: state.fetcher.policy().as_str(),
        max_attempts: state.fetcher.max_attempts(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
