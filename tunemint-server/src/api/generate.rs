//! Music generation jobs and generated tracks

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tunemint_common::models::{GeneratedTrack, GenerationJob, JobStatus};
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::services::generation::{self, StartGeneration};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub job_id: Uuid,
    pub task_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub owner: Option<String>,
}

/// POST /api/generate-music
///
/// Returns 202 once the provider accepted the task; progress is available
/// from `GET /api/generate-music/:job_id` and the event stream.
pub async fn generate_music(
    State(state): State<AppState>,
    Json(body): Json<StartGeneration>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let job = generation::start(&state, body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            job_id: job.id,
            task_id: job.task_id,
            status: job.status,
        }),
    ))
}

/// GET /api/generate-music/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<GenerationJob>> {
    state
        .tables
        .jobs
        .get(&job_id.to_string())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Generation job {}", job_id)))
}

/// GET /api/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> ApiResult<Json<Vec<GeneratedTrack>>> {
    let owner = query.owner.as_deref().map(normalize_address).transpose()?;

    let mut tracks: Vec<GeneratedTrack> = state
        .tables
        .tracks
        .list()
        .await?
        .into_iter()
        .filter(|t| owner.is_none() || t.owner == owner)
        .collect();
    tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(tracks))
}

/// GET /api/tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GeneratedTrack>> {
    state
        .tables
        .tracks
        .get(&id.to_string())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Track {}", id)))
}
