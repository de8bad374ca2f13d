//! Wallet account registration and login

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use tunemint_common::models::{Profile, UserAccount};
use tunemint_common::wallet::normalize_address;
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub address: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub address: String,
}

fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::BadRequest(
            "Username may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserAccount>)> {
    let address = normalize_address(&req.address)?;
    let username = req.username.trim().to_string();
    validate_username(&username)?;

    let account = UserAccount {
        address: address.clone(),
        username,
        created_at: Utc::now(),
        last_login_at: None,
    };

    state
        .tables
        .users
        .update(|directory| {
            if directory.accounts.contains_key(&account.address) {
                return Err(Error::Conflict(format!("{} is already registered", account.address)));
            }
            if directory.username_taken(&account.username) {
                return Err(Error::Conflict(format!("Username {} is taken", account.username)));
            }
            directory
                .accounts
                .insert(account.address.clone(), account.clone());
            Ok(())
        })
        .await?;

    state
        .tables
        .profiles
        .upsert(&address, || Profile::new(&address), |_| Ok(()))
        .await?;

    info!(address = %account.address, username = %account.username, "Account registered");
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<UserAccount>> {
    let address = normalize_address(&req.address)?;

    let account = state
        .tables
        .users
        .update(|directory| {
            let account = directory
                .accounts
                .get_mut(&address)
                .ok_or_else(|| Error::NotFound(format!("No account for {}", address)))?;
            account.last_login_at = Some(Utc::now());
            Ok(account.clone())
        })
        .await?;

    Ok(Json(account))
}
