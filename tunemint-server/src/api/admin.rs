//! Signed operator endpoints
//!
//! Requests carry `timestamp` and `hash` in the JSON body; the middleware
//! checks both against the shared secret before the handler runs. A secret
//! of 0 disables checking.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use tunemint_common::api::{validate_hash, validate_timestamp, AdminRequest, ApiAuthError};
use tunemint_common::models::WhitelistEntry;
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_ADMIN_BODY_BYTES: usize = 1024 * 1024;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/whitelist/list", post(list_whitelist))
        .route("/api/admin/whitelist/remove", post(remove_from_whitelist))
        .route("/api/admin/withdraw", post(withdraw))
}

/// Validate timestamp and hash of a signed request
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = state.config.admin_secret;
    if secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_ADMIN_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;
    let auth: AdminRequest = serde_json::from_value(json_value.clone())
        .map_err(|e| ApiError::Unauthorized(format!("Missing auth fields: {}", e)))?;

    validate_timestamp(auth.timestamp).map_err(|e| match e {
        ApiAuthError::InvalidTimestamp { reason, .. } => {
            ApiError::Unauthorized(format!("Invalid timestamp: {}", reason))
        }
        other => ApiError::Unauthorized(other.to_string()),
    })?;

    validate_hash(&auth.hash, &json_value, secret).map_err(|e| {
        if let ApiAuthError::InvalidHash { provided, calculated } = &e {
            warn!("Admin hash mismatch: provided={}, calculated={}", provided, calculated);
        }
        ApiError::Unauthorized("Invalid hash".to_string())
    })?;

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
pub struct WhitelistListing {
    pub count: usize,
    pub entries: Vec<WhitelistEntry>,
}

/// POST /api/admin/whitelist/list
pub async fn list_whitelist(State(state): State<AppState>) -> ApiResult<Json<WhitelistListing>> {
    let mut entries: Vec<WhitelistEntry> =
        state.tables.whitelist.load().await?.into_values().collect();
    entries.sort_by(|a, b| a.added_at.cmp(&b.added_at));

    Ok(Json(WhitelistListing {
        count: entries.len(),
        entries,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub address: String,
}

/// POST /api/admin/whitelist/remove
pub async fn remove_from_whitelist(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> ApiResult<Json<Value>> {
    let address = normalize_address(&req.address)?;

    let removed = state
        .tables
        .whitelist
        .update(|entries| Ok(entries.remove(&address)))
        .await?;

    match removed {
        Some(entry) => {
            info!(address = %entry.address, "Removed from whitelist");
            Ok(Json(json!({ "removed": entry.address })))
        }
        None => Err(ApiError::NotFound(format!("{} is not whitelisted", address))),
    }
}

/// POST /api/admin/withdraw
pub async fn withdraw(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let chain = state
        .chain
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Chain access is not configured".to_string()))?;

    let tx_hash = chain.withdraw().await?;
    Ok(Json(json!({ "tx_hash": tx_hash })))
}
