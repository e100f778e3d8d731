//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no auth required)
        .route("/health", get(handlers::health::health_check))
        // Token-protected routes
        .route("/api/status", get(handlers::health::status))
        .route(
            "/steam/inventory/:steam_id/:app_id/:context_id",
            get(handlers::inventory::get_inventory),
        )
        .with_state(state)
}
