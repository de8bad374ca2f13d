//! Early-access whitelist registration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use tunemint_common::models::WhitelistEntry;
use tunemint_common::wallet::normalize_address;
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_EMAIL_CHARS: usize = 254;

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub address: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WhitelistStatus {
    pub address: String,
    pub whitelisted: bool,
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email.chars().count() <= MAX_EMAIL_CHARS
        && email
            .split_once('@')
            .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid email address: {}", email)))
    }
}

/// POST /api/whitelist
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<WhitelistRequest>,
) -> ApiResult<(StatusCode, Json<WhitelistEntry>)> {
    let address = normalize_address(&req.address)?;
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if let Some(email) = &email {
        validate_email(email)?;
    }

    let entry = WhitelistEntry {
        address: address.clone(),
        email,
        added_at: Utc::now(),
    };

    let record = entry.clone();
    state
        .tables
        .whitelist
        .update(move |entries| {
            if entries.contains_key(&record.address) {
                return Err(Error::Conflict(format!("{} is already whitelisted", record.address)));
            }
            entries.insert(record.address.clone(), record);
            Ok(())
        })
        .await?;

    info!(address = %address, "Whitelist registration");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/whitelist/check/:address
pub async fn check(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<WhitelistStatus>> {
    let address = normalize_address(&address)?;
    let whitelisted = state.tables.whitelist.load().await?.contains_key(&address);
    Ok(Json(WhitelistStatus {
        address,
        whitelisted,
    }))
}
