//! Inventory endpoint

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::api::middleware::Authorized;
use crate::api::server::AppState;
use crate::error::RelayError;
use crate::models::InventoryRequest;

/// `GET /steam/inventory/:steam_id/:app_id/:context_id`
#[instrument(skip(state, _auth))]
pub async fn get_inventory(
    _auth: Authorized,
    State(state): State<AppState>,
    Path((steam_id, app_id, context_id)): Path<(String, u32, u64)>,
) -> Result<Json<Value>, RelayError> {
    let request = InventoryRequest::new(steam_id, app_id, context_id);

    let fetched = tokio::time::timeout(state.request_timeout, state.fetcher.fetch(&request)).await;

    match fetched {
        Ok(Ok(payload)) => {
            info!("Successfully fetched user's steam inventory ({})", request.steam_id);
            Ok(Json(request.annotate(payload)))
        }
        Ok(Err(e)) => {
            error!("Failed to fetch user's steam inventory: {}", e);
            Err(RelayError::InventoryUnavailable {
                reason: e.to_string(),
            })
        }
        Err(_) => {
            error!("Timeout while fetching user's steam inventory ({})", request.steam_id);
            Err(RelayError::Timeout(format!(
                "Timeout while fetching user's steam inventory ({})",
                request.steam_id
            )))
        }
    }
}
