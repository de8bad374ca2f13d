//! Community profiles

use axum::{
    extract::{Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use tunemint_common::models::Profile;
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_DISPLAY_NAME_CHARS: usize = 50;
const MAX_BIO_CHARS: usize = 500;
const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;
const MAX_AVATAR_URL_CHARS: usize = 2048;
/// Request body cap for profile updates; fits a base64 avatar at the size limit
pub const MAX_BODY_BYTES: usize = 3 * 1024 * 1024;
const MAX_SOCIAL_LINKS: usize = 10;
const MAX_SOCIAL_KEY_CHARS: usize = 32;
const MAX_SOCIAL_URL_CHARS: usize = 256;

/// Body of `PUT /api/community/profile`
///
/// Absent fields are left unchanged; an empty string clears a field.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub social_links: Option<BTreeMap<String, String>>,
}

fn check_len(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{} longer than {} characters",
            field, max
        )));
    }
    Ok(())
}

/// Accept an `https://` URL or a base64 `data:image/...` payload
pub fn validate_avatar(avatar: &str) -> ApiResult<()> {
    if avatar.starts_with("https://") {
        return check_len("Avatar URL", avatar, MAX_AVATAR_URL_CHARS);
    }

    let payload = avatar
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .ok_or_else(|| {
            ApiError::BadRequest("Avatar must be an https URL or a base64 image".to_string())
        })?;

    // Cheap bound before decoding
    if payload.len() / 4 * 3 > MAX_AVATAR_BYTES + 3 {
        return Err(ApiError::BadRequest("Avatar image exceeds 2 MiB".to_string()));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ApiError::BadRequest(format!("Avatar is not valid base64: {}", e)))?;
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::BadRequest("Avatar image exceeds 2 MiB".to_string()));
    }
    Ok(())
}

fn validate_social_links(links: &BTreeMap<String, String>) -> ApiResult<()> {
    if links.len() > MAX_SOCIAL_LINKS {
        return Err(ApiError::BadRequest(format!(
            "At most {} social links",
            MAX_SOCIAL_LINKS
        )));
    }
    for (name, url) in links {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Social link name is empty".to_string()));
        }
        check_len("Social link name", name, MAX_SOCIAL_KEY_CHARS)?;
        check_len("Social link", url, MAX_SOCIAL_URL_CHARS)?;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ApiError::BadRequest(format!("Social link {} is not a URL", name)));
        }
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// GET /api/community/profile/:address
pub async fn get_profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Profile>> {
    let address = normalize_address(&address)?;
    state
        .tables
        .profiles
        .get(&address)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No profile for {}", address)))
}

/// PUT /api/community/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Profile>> {
    let address = normalize_address(&update.address)?;

    if let Some(name) = &update.display_name {
        check_len("Display name", name.trim(), MAX_DISPLAY_NAME_CHARS)?;
    }
    if let Some(bio) = &update.bio {
        check_len("Bio", bio.trim(), MAX_BIO_CHARS)?;
    }
    if let Some(avatar) = update.avatar.as_deref().map(str::trim) {
        if !avatar.is_empty() {
            validate_avatar(avatar)?;
        }
    }
    if let Some(links) = &update.social_links {
        validate_social_links(links)?;
    }

    let profile = state
        .tables
        .profiles
        .upsert(
            &address,
            || Profile::new(&address),
            |profile| {
                if let Some(name) = update.display_name {
                    profile.display_name = non_empty(name);
                }
                if let Some(bio) = update.bio {
                    profile.bio = non_empty(bio);
                }
                if let Some(avatar) = update.avatar {
                    profile.avatar = non_empty(avatar);
                }
                if let Some(links) = update.social_links {
                    profile.social_links = links;
                }
                profile.updated_at = Utc::now();
                Ok(profile.clone())
            },
        )
        .await?;

    Ok(Json(profile))
}

/// GET /api/community/profiles
///
/// Most active sharers first.
pub async fn list_profiles(State(state): State<AppState>) -> ApiResult<Json<Vec<Profile>>> {
    let mut profiles = state.tables.profiles.list().await?;
    profiles.sort_by(|a, b| {
        b.stats
            .tracks_shared
            .cmp(&a.stats.tracks_shared)
            .then(b.stats.plays.cmp(&a.stats.plays))
            .then(a.address.cmp(&b.address))
    });
    Ok(Json(profiles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_forms() {
        assert!(validate_avatar("https://cdn.example/a.png").is_ok());
        assert!(validate_avatar("http://cdn.example/a.png").is_err());
        assert!(validate_avatar("data:image/png;base64,aGVsbG8=").is_ok());
        assert!(validate_avatar("data:image/png;base64,!!!").is_err());
        assert!(validate_avatar("data:text/plain;base64,aGVsbG8=").is_err());
    }

    #[test]
    fn test_avatar_size_limit() {
        let big = STANDARD.encode(vec![0u8; MAX_AVATAR_BYTES + 1]);
        assert!(validate_avatar(&format!("data:image/png;base64,{}", big)).is_err());

        let ok = STANDARD.encode(vec![0u8; 1024]);
        assert!(validate_avatar(&format!("data:image/png;base64,{}", ok)).is_ok());
    }

    #[test]
    fn test_social_link_limits() {
        let links: BTreeMap<String, String> = (0..11)
            .map(|i| (format!("site{}", i), "https://example.com".to_string()))
            .collect();
        assert!(validate_social_links(&links).is_err());

        let mut links = BTreeMap::new();
        links.insert("x".to_string(), "ftp://example.com".to_string());
        assert!(validate_social_links(&links).is_err());
    }
}
