//! Follow relations

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunemint_common::models::FollowEdges;
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub follower: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct FollowResult {
    pub following: bool,
    pub follower_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FollowSummary {
    pub address: String,
    #[serde(flatten)]
    pub edges: FollowEdges,
    pub following_count: usize,
    pub follower_count: usize,
}

/// POST /api/community/follow
///
/// Follows `target`, or unfollows when already following.
pub async fn toggle_follow(
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> ApiResult<Json<FollowResult>> {
    let follower = normalize_address(&req.follower)?;
    let target = normalize_address(&req.target)?;
    if follower == target {
        return Err(ApiError::BadRequest("Cannot follow yourself".to_string()));
    }

    let result = state
        .tables
        .follows
        .update(|graph| {
            let following = graph.toggle(&follower, &target);
            Ok(FollowResult {
                following,
                follower_count: graph.edges(&target).followers.len(),
            })
        })
        .await?;

    debug!(follower = %follower, target = %target, following = result.following, "Follow toggled");
    Ok(Json(result))
}

/// GET /api/community/follow/:address
pub async fn get_follows(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<FollowSummary>> {
    let address = normalize_address(&address)?;
    let edges = state.tables.follows.load().await?.edges(&address);

    Ok(Json(FollowSummary {
        following_count: edges.following.len(),
        follower_count: edges.followers.len(),
        address,
        edges,
    }))
}
