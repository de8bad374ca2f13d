//! NFT metadata minting on IPFS
//!
//! Pins the track audio (unless already pinned) and an ERC-721 metadata
//! document pointing at it; the resulting `ipfs://` URI is stored on the
//! track. The on-chain mint itself is sent by the owner's wallet.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use tunemint_common::models::GeneratedTrack;
use tunemint_common::wallet::normalize_address;
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub track_id: Uuid,
    pub owner: String,
}

#[derive(Debug, Serialize)]
pub struct MintResponse {
    pub track_id: Uuid,
    pub token_uri: String,
    pub metadata_cid: String,
    pub audio_cid: String,
    pub metadata_url: String,
}

/// ERC-721 metadata for a generated track
pub fn token_metadata(track: &GeneratedTrack, audio_cid: &str) -> Value {
    let mut attributes = vec![json!({ "trait_type": "Generator", "value": "Suno" })];
    if !track.style.is_empty() {
        attributes.push(json!({ "trait_type": "Style", "value": track.style }));
    }
    if let Some(duration) = track.duration_secs {
        attributes.push(json!({
            "trait_type": "Duration",
            "value": duration.round() as u64,
            "display_type": "number",
        }));
    }

    json!({
        "name": track.title,
        "description": track.prompt,
        "image": track.image_url.clone().unwrap_or_default(),
        "animation_url": format!("ipfs://{}", audio_cid),
        "attributes": attributes,
    })
}

/// POST /api/mint-nft
pub async fn mint_nft(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> ApiResult<Json<MintResponse>> {
    let ipfs = state
        .ipfs
        .clone()
        .ok_or_else(|| ApiError::Unavailable("IPFS pinning is not configured".to_string()))?;
    let owner = normalize_address(&req.owner)?;
    let key = req.track_id.to_string();

    let track = state
        .tables
        .tracks
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Track {}", req.track_id)))?;
    if track.owner.as_deref() != Some(owner.as_str()) {
        return Err(ApiError::Forbidden(format!("{} does not own this track", owner)));
    }
    if track.token_uri.is_some() {
        return Err(ApiError::Conflict(format!("Track {} is already minted", track.id)));
    }

    let audio_cid = match &track.ipfs_cid {
        Some(cid) => cid.clone(),
        None => {
            let path = state.audio_dir.join(&track.filename);
            ipfs.pin_file(&path, &track.filename).await?
        }
    };

    let metadata = token_metadata(&track, &audio_cid);
    let metadata_cid = ipfs
        .pin_json(&metadata, &format!("{}-metadata", track.id))
        .await?;
    let token_uri = format!("ipfs://{}", metadata_cid);

    let (cid, uri) = (audio_cid.clone(), token_uri.clone());
    state
        .tables
        .tracks
        .update(&key, move |track| {
            // A concurrent mint may have finished while pinning
            if track.token_uri.is_some() {
                return Err(Error::Conflict(format!("Track {} is already minted", track.id)));
            }
            track.ipfs_cid = Some(cid);
            track.token_uri = Some(uri);
            Ok(())
        })
        .await?;

    info!(track_id = %track.id, token_uri = %token_uri, "Track metadata minted");
    Ok(Json(MintResponse {
        track_id: track.id,
        metadata_url: ipfs.gateway_url(&metadata_cid),
        token_uri,
        metadata_cid,
        audio_cid,
    }))
}
