//! Publishing generated tracks to the community feed

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use tunemint_common::models::{Profile, SharedTrack};
use tunemint_common::wallet::normalize_address;
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub track_id: Uuid,
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerBody {
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareQuery {
    pub owner: Option<String>,
}

/// Apply `f` to the owner's profile stats, creating the profile if needed
///
/// Stats are secondary data; failures are logged only.
pub(crate) async fn bump_profile<F>(state: &AppState, owner: &str, f: F)
where
    F: FnOnce(&mut Profile) + Send,
{
    let result = state
        .tables
        .profiles
        .upsert(
            owner,
            || Profile::new(owner),
            |profile| {
                f(profile);
                Ok(())
            },
        )
        .await;
    if let Err(e) = result {
        warn!(owner = %owner, "Failed to update profile stats: {}", e);
    }
}

/// POST /api/share-music
pub async fn share_track(
    State(state): State<AppState>,
    Json(req): Json<ShareRequest>,
) -> ApiResult<(StatusCode, Json<SharedTrack>)> {
    let owner = normalize_address(&req.owner)?;

    let track = state
        .tables
        .tracks
        .get(&req.track_id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Track {}", req.track_id)))?;
    if track.owner.as_deref() != Some(owner.as_str()) {
        return Err(ApiError::Forbidden(format!("{} does not own this track", owner)));
    }

    let shared = SharedTrack {
        id: Uuid::new_v4(),
        track_id: track.id,
        owner: owner.clone(),
        title: track.title.clone(),
        style: track.style.clone(),
        filename: track.filename.clone(),
        audio_url: match (&state.ipfs, &track.ipfs_cid) {
            (Some(ipfs), Some(cid)) => Some(ipfs.gateway_url(cid)),
            _ => None,
        },
        plays: 0,
        shared_at: Utc::now(),
    };

    let record = shared.clone();
    state
        .tables
        .shares
        .update(move |shares| {
            if shares.values().any(|s| s.track_id == record.track_id) {
                return Err(Error::Conflict(format!("Track {} is already shared", record.track_id)));
            }
            shares.insert(record.id, record);
            Ok(())
        })
        .await?;

    bump_profile(&state, &owner, |p| p.stats.tracks_shared += 1).await;
    info!(share_id = %shared.id, track_id = %shared.track_id, owner = %owner, "Track shared");

    Ok((StatusCode::CREATED, Json(shared)))
}

/// GET /api/share-music
///
/// Newest first, optionally filtered by owner.
pub async fn list_shared(
    State(state): State<AppState>,
    Query(query): Query<ShareQuery>,
) -> ApiResult<Json<Vec<SharedTrack>>> {
    let owner = query.owner.as_deref().map(normalize_address).transpose()?;

    let mut shared: Vec<SharedTrack> = state
        .tables
        .shares
        .load()
        .await?
        .into_values()
        .filter(|s| owner.as_ref().map_or(true, |o| &s.owner == o))
        .collect();
    shared.sort_by(|a, b| b.shared_at.cmp(&a.shared_at));

    Ok(Json(shared))
}

/// DELETE /api/share-music/:id
pub async fn unshare_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OwnerBody>,
) -> ApiResult<StatusCode> {
    let owner = normalize_address(&body.owner)?;

    // Ok(false): the share exists but belongs to someone else
    let outcome = state
        .tables
        .shares
        .update(|shares| {
            let Some(existing) = shares.get(&id) else {
                return Err(Error::NotFound(format!("Shared track {}", id)));
            };
            if existing.owner != owner {
                return Ok(false);
            }
            shares.remove(&id);
            Ok(true)
        })
        .await?;

    if !outcome {
        return Err(ApiError::Forbidden(format!("{} did not share this track", owner)));
    }

    bump_profile(&state, &owner, |p| {
        p.stats.tracks_shared = p.stats.tracks_shared.saturating_sub(1)
    })
    .await;
    info!(share_id = %id, "Track unshared");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/share-music/:id/play
pub async fn record_play(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SharedTrack>> {
    let shared = state
        .tables
        .shares
        .update(|shares| {
            let shared = shares
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Shared track {}", id)))?;
            shared.plays += 1;
            Ok(shared.clone())
        })
        .await?;

    bump_profile(&state, &shared.owner, |p| p.stats.plays += 1).await;
    Ok(Json(shared))
}
