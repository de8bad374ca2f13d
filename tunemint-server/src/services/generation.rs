//! Generation jobs: charge, submit, monitor, compensate
//!
//! `start` charges the payer and submits the task, then hands the task to a
//! spawned monitor. The monitor polls the provider on a fixed interval. A
//! successful task has its audio stored locally (and pinned when IPFS is
//! configured). A failed or timed-out task triggers one best-effort refund
//! whose outcome is recorded on the job; refunds are never retried.

use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tunemint_common::events::AppEvent;
use tunemint_common::models::{
    GeneratedTrack, GenerationJob, JobStatus, Payer, Profile, RefundOutcome,
};
use tunemint_common::wallet::{normalize_address, normalize_tx_hash};
use tunemint_common::Error;

use super::chain::{redeem_transaction, verify_transaction, USE_CREDITS};
use super::suno_client::{GenerateRequest, SunoClient, SunoClip, TaskStatus};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Credits consumed by one generation
pub const GENERATION_COST: u64 = 1;

/// Body of `POST /api/generate-music`
#[derive(Debug, Clone, Deserialize)]
pub struct StartGeneration {
    #[serde(flatten)]
    pub request: GenerateRequest,
    pub payer: Payer,
    /// Wallet to own the tracks when paying off-chain
    #[serde(default)]
    pub owner: Option<String>,
}

/// Why a monitored job did not complete
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Generation failed ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Failed {
        status: String,
        message: Option<String>,
    },

    #[error("Generation timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },

    #[error("Storing generated audio failed: {0}")]
    Storage(String),
}

/// Charge the payer, submit to the provider and spawn the monitor
pub async fn start(state: &AppState, body: StartGeneration) -> ApiResult<GenerationJob> {
    body.request.validate().map_err(ApiError::BadRequest)?;

    let suno = state
        .suno
        .clone()
        .ok_or_else(|| ApiError::Unavailable("Music generation is not configured".to_string()))?;

    let payer = normalize_payer(body.payer)?;
    let owner = match (payer.wallet(), body.owner.as_deref()) {
        (Some(wallet), _) => Some(wallet.to_string()),
        (None, Some(owner)) => Some(normalize_address(owner)?),
        (None, None) => None,
    };

    state
        .gen_limiter
        .check(&payer.rate_limit_key())
        .await
        .into_result()?;

    charge(state, &payer).await?;

    let job_id = Uuid::new_v4();
    let task_id = match suno.submit(&body.request).await {
        Ok(task_id) => task_id,
        Err(e) => {
            warn!(job_id = %job_id, "Suno submission failed: {}", e);
            refund(state, job_id, &payer).await;
            return Err(e.into());
        }
    };

    let now = Utc::now();
    let job = GenerationJob {
        id: job_id,
        task_id: task_id.clone(),
        payer,
        owner,
        prompt: body.request.prompt.trim().to_string(),
        style: body.request.style.clone(),
        title: body.request.title.clone(),
        instrumental: body.request.instrumental,
        status: JobStatus::Pending,
        provider_status: None,
        attempts: 0,
        track_ids: Vec::new(),
        error: None,
        refund: None,
        created_at: now,
        updated_at: now,
    };
    state.tables.jobs.put(&job_id.to_string(), &job).await?;

    info!(job_id = %job_id, task_id = %task_id, "Generation submitted");
    state.event_bus.emit_lossy(AppEvent::GenerationSubmitted {
        job_id,
        task_id: task_id.clone(),
        timestamp: now,
    });

    tokio::spawn(monitor(state.clone(), suno, job_id, task_id, 1));
    Ok(job)
}

/// Restart monitors for jobs left unfinished by a previous process
pub async fn resume_unfinished(state: &AppState) -> ApiResult<usize> {
    let Some(suno) = state.suno.clone() else {
        return Ok(0);
    };

    let mut resumed = 0;
    for job in state.tables.jobs.list().await? {
        if job.status.is_terminal() {
            continue;
        }
        info!(job_id = %job.id, task_id = %job.task_id, "Resuming generation monitor");
        // Attempts already spent count against the budget
        tokio::spawn(monitor(
            state.clone(),
            suno.clone(),
            job.id,
            job.task_id,
            job.attempts.saturating_add(1),
        ));
        resumed += 1;
    }
    Ok(resumed)
}

fn normalize_payer(payer: Payer) -> ApiResult<Payer> {
    Ok(match payer {
        Payer::Offchain { kind, id } => {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(ApiError::BadRequest("Payer id is required".to_string()));
            }
            Payer::Offchain { kind, id }
        }
        Payer::Onchain { address, tx_hash } => Payer::Onchain {
            address: normalize_address(&address)?,
            tx_hash: normalize_tx_hash(&tx_hash)?,
        },
    })
}

async fn charge(state: &AppState, payer: &Payer) -> ApiResult<()> {
    match payer {
        Payer::Offchain { kind, id } => {
            state.credits.deduct(*kind, id, GENERATION_COST).await?;
        }
        Payer::Onchain { address, tx_hash } => {
            let chain = state
                .chain
                .as_ref()
                .ok_or_else(|| ApiError::Unavailable("Chain access is not configured".to_string()))?;
            let call = verify_transaction(chain.as_ref(), tx_hash, address, USE_CREDITS).await?;
            if call.argument < GENERATION_COST {
                return Err(ApiError::BadRequest(format!(
                    "Transaction {} spends {} credits, {} required",
                    tx_hash, call.argument, GENERATION_COST
                )));
            }
            redeem_transaction(&state.tables.redeemed_txs, tx_hash).await?;
        }
    }
    Ok(())
}

/// Poll, store and finish one job; never returns an error
///
/// Polling resumes at `first_attempt` and gives up after the configured
/// maximum.
pub async fn monitor(
    state: AppState,
    suno: Arc<SunoClient>,
    job_id: Uuid,
    task_id: String,
    first_attempt: u32,
) {
    let result = match poll_task(&state, &suno, job_id, &task_id, first_attempt).await {
        Ok(clips) => store_tracks(&state, job_id, clips).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(track_ids) => {
            info!(job_id = %job_id, tracks = track_ids.len(), "Generation completed");
            state.event_bus.emit_lossy(AppEvent::GenerationCompleted {
                job_id,
                track_ids,
                timestamp: Utc::now(),
            });
        }
        Err(e) => fail_job(&state, job_id, e).await,
    }
}

async fn poll_task(
    state: &AppState,
    suno: &SunoClient,
    job_id: Uuid,
    task_id: &str,
    first_attempt: u32,
) -> Result<Vec<SunoClip>, MonitorError> {
    let interval = Duration::from_millis(state.config.suno.poll_interval_ms);
    let max_attempts = state.config.suno.max_poll_attempts;

    for attempt in first_attempt.max(1)..=max_attempts {
        tokio::time::sleep(interval).await;

        match suno.status(task_id).await {
            Ok(TaskStatus::Success(clips)) => return Ok(clips),
            Ok(TaskStatus::Failed { status, message }) => {
                return Err(MonitorError::Failed { status, message })
            }
            Ok(progress) => {
                let label = progress.label().to_string();
                debug!(job_id = %job_id, attempt, status = %label, "Generation in progress");
                record_progress(state, job_id, attempt, Some(&label)).await;
                state.event_bus.emit_lossy(AppEvent::GenerationProgress {
                    job_id,
                    provider_status: label,
                    attempt,
                    max_attempts,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                // Transport errors use up an attempt but do not end the job
                warn!(job_id = %job_id, attempt, "Status check failed: {}", e);
                record_progress(state, job_id, attempt, None).await;
            }
        }
    }

    Err(MonitorError::TimedOut {
        attempts: max_attempts,
    })
}

async fn record_progress(state: &AppState, job_id: Uuid, attempt: u32, status: Option<&str>) {
    let result = state
        .tables
        .jobs
        .update(&job_id.to_string(), |job| {
            job.attempts = attempt;
            if let Some(status) = status {
                job.provider_status = Some(status.to_string());
                if status != "PENDING" {
                    job.status = JobStatus::Running;
                }
            }
            job.updated_at = Utc::now();
            Ok(())
        })
        .await;

    if let Err(e) = result {
        warn!(job_id = %job_id, "Failed to record progress: {}", e);
    }
}

async fn store_tracks(
    state: &AppState,
    job_id: Uuid,
    clips: Vec<SunoClip>,
) -> Result<Vec<Uuid>, MonitorError> {
    let storage = |e: Error| MonitorError::Storage(e.to_string());

    let job = state
        .tables
        .jobs
        .get(&job_id.to_string())
        .await
        .map_err(storage)?
        .ok_or_else(|| MonitorError::Storage(format!("Job {} disappeared", job_id)))?;

    if clips.is_empty() {
        return Err(MonitorError::Storage("Provider returned no clips".to_string()));
    }

    let mut downloaded: Vec<(String, SunoClip)> = Vec::with_capacity(clips.len());
    for (n, clip) in clips.into_iter().enumerate() {
        let filename = format!("{}-{}.mp3", job_id, n);
        let path = state.audio_dir.join(&filename);
        if let Err(e) = download_audio(&state.http_client, &clip.audio_url, &path).await {
            remove_audio(state, downloaded.iter().map(|(name, _)| name)).await;
            return Err(e);
        }
        downloaded.push((filename, clip));
    }

    let mut tracks = Vec::with_capacity(downloaded.len());
    for (filename, clip) in downloaded {
        let ipfs_cid = match &state.ipfs {
            Some(ipfs) => match ipfs.pin_file(&state.audio_dir.join(&filename), &filename).await {
                Ok(cid) => Some(cid),
                Err(e) => {
                    warn!(job_id = %job_id, file = %filename, "Pinning failed, keeping local copy: {}", e);
                    None
                }
            },
            None => None,
        };

        tracks.push(GeneratedTrack {
            id: Uuid::new_v4(),
            job_id,
            owner: job.owner.clone(),
            title: clip
                .title
                .clone()
                .or_else(|| job.title.clone())
                .unwrap_or_else(|| "Untitled".to_string()),
            style: clip.tags.clone().or_else(|| job.style.clone()).unwrap_or_default(),
            prompt: job.prompt.clone(),
            filename,
            source_url: clip.audio_url,
            image_url: clip.image_url,
            duration_secs: clip.duration,
            ipfs_cid,
            token_uri: None,
            created_at: Utc::now(),
        });
    }

    let track_ids: Vec<Uuid> = tracks.iter().map(|t| t.id).collect();
    if let Err(e) = write_tracks(state, job_id, &tracks).await {
        for id in &track_ids {
            if let Err(del) = state.tables.tracks.delete(&id.to_string()).await {
                warn!(job_id = %job_id, track_id = %id, "Failed to remove track record: {}", del);
            }
        }
        remove_audio(state, tracks.iter().map(|t| &t.filename)).await;
        return Err(storage(e));
    }

    if let Some(owner) = &job.owner {
        let generated = track_ids.len() as u64;
        let bumped = state
            .tables
            .profiles
            .upsert(
                owner,
                || Profile::new(owner),
                |profile| {
                    profile.stats.tracks_generated += generated;
                    Ok(())
                },
            )
            .await;
        if let Err(e) = bumped {
            warn!(owner = %owner, "Failed to update profile stats: {}", e);
        }
    }

    Ok(track_ids)
}

/// Persist every track and mark the job completed
async fn write_tracks(
    state: &AppState,
    job_id: Uuid,
    tracks: &[GeneratedTrack],
) -> tunemint_common::Result<()> {
    for track in tracks {
        state.tables.tracks.put(&track.id.to_string(), track).await?;
    }

    let ids: Vec<Uuid> = tracks.iter().map(|t| t.id).collect();
    state
        .tables
        .jobs
        .update(&job_id.to_string(), move |job| {
            job.status = JobStatus::Completed;
            job.provider_status = Some("SUCCESS".to_string());
            job.track_ids = ids;
            job.updated_at = Utc::now();
            Ok(())
        })
        .await
}

async fn remove_audio<'a>(state: &AppState, filenames: impl Iterator<Item = &'a String>) {
    for filename in filenames {
        let path = state.audio_dir.join(filename);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Failed to remove audio file: {}", e);
            }
        }
    }
}

async fn download_audio(client: &reqwest::Client, url: &str, path: &Path) -> Result<(), MonitorError> {
    let storage = |msg: String| MonitorError::Storage(msg);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| storage(format!("Download {} failed: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(storage(format!("Download {} returned {}", url, response.status())));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| storage(format!("Download {} failed: {}", url, e)))?;

    let partial = path.with_extension("mp3.part");
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|e| storage(format!("Write {} failed: {}", partial.display(), e)))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| storage(format!("Rename {} failed: {}", path.display(), e)))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Audio stored");
    Ok(())
}

async fn fail_job(state: &AppState, job_id: Uuid, err: MonitorError) {
    let timed_out = matches!(err, MonitorError::TimedOut { .. });
    let reason = err.to_string();
    warn!(job_id = %job_id, timed_out, "{}", reason);

    state.event_bus.emit_lossy(AppEvent::GenerationFailed {
        job_id,
        reason: reason.clone(),
        timed_out,
        timestamp: Utc::now(),
    });

    let payer = match state.tables.jobs.get(&job_id.to_string()).await {
        Ok(Some(job)) => job.payer,
        Ok(None) => {
            error!(job_id = %job_id, "Failed job has no record, cannot refund");
            return;
        }
        Err(e) => {
            error!(job_id = %job_id, "Failed to load job for refund: {}", e);
            return;
        }
    };

    let outcome = refund(state, job_id, &payer).await;

    let status = if timed_out {
        JobStatus::TimedOut
    } else {
        JobStatus::Failed
    };
    let result = state
        .tables
        .jobs
        .update(&job_id.to_string(), |job| {
            job.status = status;
            job.error = Some(reason);
            job.refund = Some(outcome);
            job.updated_at = Utc::now();
            Ok(())
        })
        .await;
    if let Err(e) = result {
        error!(job_id = %job_id, "Failed to record job failure: {}", e);
    }
}

/// Give the generation cost back; failures are logged and left for manual
/// reconciliation
async fn refund(state: &AppState, job_id: Uuid, payer: &Payer) -> RefundOutcome {
    let result: Result<Option<String>, String> = match payer {
        Payer::Offchain { kind, id } => state
            .credits
            .refund(*kind, id, GENERATION_COST)
            .await
            .map(|_| None)
            .map_err(|e| e.to_string()),
        Payer::Onchain { address, .. } => match &state.chain {
            Some(chain) => chain
                .refund_credits(address, GENERATION_COST)
                .await
                .map(Some)
                .map_err(|e| e.to_string()),
            None => Err("Chain access is not configured".to_string()),
        },
    };

    let payer_key = payer.rate_limit_key();
    let at = Utc::now();
    match result {
        Ok(tx_hash) => {
            info!(job_id = %job_id, payer = %payer_key, tx_hash = ?tx_hash, "Refund issued");
            state.event_bus.emit_lossy(AppEvent::RefundIssued {
                job_id,
                payer: payer_key,
                tx_hash: tx_hash.clone(),
                timestamp: at,
            });
            RefundOutcome {
                refunded: true,
                tx_hash,
                error: None,
                at,
            }
        }
        Err(e) => {
            error!(job_id = %job_id, payer = %payer_key, "Refund failed, needs manual reconciliation: {}", e);
            state.event_bus.emit_lossy(AppEvent::RefundFailed {
                job_id,
                payer: payer_key,
                error: e.clone(),
                timestamp: at,
            });
            RefundOutcome {
                refunded: false,
                tx_hash: None,
                error: Some(e),
                at,
            }
        }
    }
}
