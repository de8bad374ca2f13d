//! Track likes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use tunemint_common::wallet::normalize_address;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub track_id: Uuid,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct LikeState {
    pub track_id: Uuid,
    /// Whether the caller likes the track; absent when no address was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LikeQuery {
    pub address: Option<String>,
}

/// POST /api/community/like
///
/// Likes the track, or removes the like when already liked.
pub async fn toggle_like(
    State(state): State<AppState>,
    Json(req): Json<LikeRequest>,
) -> ApiResult<Json<LikeState>> {
    let address = normalize_address(&req.address)?;
    let (liked, count) = state
        .tables
        .likes
        .update(|book| Ok(book.toggle(req.track_id, &address)))
        .await?;

    Ok(Json(LikeState {
        track_id: req.track_id,
        liked: Some(liked),
        count,
    }))
}

/// GET /api/community/like/:track_id
pub async fn get_likes(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
    Query(query): Query<LikeQuery>,
) -> ApiResult<Json<LikeState>> {
    let address = query.address.as_deref().map(normalize_address).transpose()?;
    let book = state.tables.likes.load().await?;

    Ok(Json(LikeState {
        track_id,
        liked: address.map(|a| book.has_liked(&track_id, &a)),
        count: book.count(&track_id),
    }))
}
