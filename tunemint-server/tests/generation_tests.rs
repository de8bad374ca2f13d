//! Generation flow against a fake Suno provider
//!
//! The fake serves the submit and record-info endpoints plus the clip audio,
//! so the monitor runs end to end: charge, poll, download, refund.

mod helpers;

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use helpers::{addr, tx, FakeChain, TestApp};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tunemint_common::models::{GenerationJob, JobStatus, LedgerKind, Payer};
use tunemint_server::services::generation::resume_unfinished;
use uuid::Uuid;

/// Start a fake provider; `status` is what record-info reports for every task
async fn fake_suno(submit_code: i64, status: &'static str) -> String {
    let router = Router::new()
        .route(
            "/api/v1/generate",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer test-key")
                );
                assert!(body["prompt"].is_string());
                if submit_code == 200 {
                    Json(json!({ "code": 200, "msg": "success", "data": { "taskId": "task-1" } }))
                } else {
                    Json(json!({ "code": submit_code, "msg": "insufficient provider credits", "data": null }))
                }
            }),
        )
        .route(
            "/api/v1/generate/record-info",
            get(move |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(query.get("taskId").map(String::as_str), Some("task-1"));
                let host = headers
                    .get("host")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("127.0.0.1")
                    .to_string();
                let data = match status {
                    "SUCCESS" => json!({
                        "taskId": "task-1",
                        "status": "SUCCESS",
                        "response": { "sunoData": [{
                            "id": "clip-1",
                            "audioUrl": format!("http://{}/files/clip-1.mp3", host),
                            "imageUrl": "https://img.example/clip-1.png",
                            "title": "Night Drive",
                            "tags": "synthwave",
                            "duration": 121.5
                        }] }
                    }),
                    // Second clip points at audio the provider never serves
                    "SUCCESS_PARTIAL" => json!({
                        "taskId": "task-1",
                        "status": "SUCCESS",
                        "response": { "sunoData": [
                            { "id": "clip-1", "audioUrl": format!("http://{}/files/clip-1.mp3", host) },
                            { "id": "clip-2", "audioUrl": format!("http://{}/files/clip-2.mp3", host) }
                        ] }
                    }),
                    "GENERATE_AUDIO_FAILED" => json!({
                        "taskId": "task-1",
                        "status": "GENERATE_AUDIO_FAILED",
                        "errorMessage": "model overloaded"
                    }),
                    other => json!({ "taskId": "task-1", "status": other }),
                };
                Json(json!({ "code": 200, "msg": "success", "data": data }))
            }),
        )
        .route("/files/clip-1.mp3", get(|| async { b"ID3fake-mp3-bytes".to_vec() }));

    helpers::spawn_server(router).await
}

/// Pinning service that rejects every upload
async fn failing_pinata() -> String {
    let router = Router::new().route(
        "/pinning/pinFileToIPFS",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "pinning backend down") }),
    );
    helpers::spawn_server(router).await
}

/// A job persisted by an earlier process, still waiting on `task-1`
async fn seed_job(app: &TestApp, attempts: u32) -> GenerationJob {
    let now = Utc::now();
    let job = GenerationJob {
        id: Uuid::new_v4(),
        task_id: "task-1".to_string(),
        payer: Payer::Offchain {
            kind: LedgerKind::Fingerprint,
            id: "fp-resume".to_string(),
        },
        owner: Some(addr(4)),
        prompt: "slow piano".to_string(),
        style: None,
        title: None,
        instrumental: true,
        status: JobStatus::Running,
        provider_status: Some("TEXT_SUCCESS".to_string()),
        attempts,
        track_ids: Vec::new(),
        error: None,
        refund: None,
        created_at: now,
        updated_at: now,
    };
    app.state
        .tables
        .jobs
        .put(&job.id.to_string(), &job)
        .await
        .unwrap();
    job
}

async fn app_with_suno(base_url: String) -> TestApp {
    TestApp::new(move |config| {
        config.suno.base_url = base_url;
        config.suno.api_key = Some("test-key".to_string());
        config.suno.poll_interval_ms = 10;
        config.suno.max_poll_attempts = 5;
        config.suno.requests_per_second = 1000;
    })
    .await
}

fn offchain_request(owner: Option<String>) -> Value {
    json!({
        "prompt": "late night city drive",
        "style": "synthwave",
        "payer": { "offchain": { "kind": "fingerprint", "id": "fp-1" } },
        "owner": owner,
    })
}

#[tokio::test]
async fn test_successful_generation_stores_track() {
    let app = app_with_suno(fake_suno(200, "SUCCESS").await).await;

    let (status, body) = app.post("/api/generate-music", offchain_request(Some(addr(1)))).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", body);
    assert_eq!(body["task_id"], "task-1");
    assert_eq!(body["status"], "pending");

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.track_ids.len(), 1);
    assert_eq!(job.provider_status.as_deref(), Some("SUCCESS"));
    assert!(job.refund.is_none());

    let filename = format!("{}-0.mp3", job.id);
    let stored = std::fs::read(app.dir.path().join("audio").join(&filename)).unwrap();
    assert_eq!(stored, b"ID3fake-mp3-bytes");

    let (status, tracks) = app.get(&format!("/api/tracks?owner={}", addr(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracks.as_array().unwrap().len(), 1);
    assert_eq!(tracks[0]["title"], "Night Drive");
    assert_eq!(tracks[0]["style"], "synthwave");
    assert_eq!(tracks[0]["filename"], filename.as_str());

    let (status, _) = app.get(&format!("/audio/{}", filename)).await;
    assert_eq!(status, StatusCode::OK);

    // One credit spent, nothing refunded
    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 2);

    let (_, profile) = app.get(&format!("/api/community/profile/{}", addr(1))).await;
    assert_eq!(profile["stats"]["tracks_generated"], 1);
}

#[tokio::test]
async fn test_provider_failure_refunds_credit() {
    let app = app_with_suno(fake_suno(200, "GENERATE_AUDIO_FAILED").await).await;

    let (status, body) = app.post("/api/generate-music", offchain_request(None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("GENERATE_AUDIO_FAILED"));
    assert!(job.error.as_deref().unwrap().contains("model overloaded"));
    let refund = job.refund.unwrap();
    assert!(refund.refunded);
    assert!(refund.tx_hash.is_none());

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
    assert_eq!(balance["total_refunded"], 1);
}

#[tokio::test]
async fn test_polling_gives_up_and_refunds() {
    let app = app_with_suno(fake_suno(200, "TEXT_SUCCESS").await).await;

    let (_, body) = app.post("/api/generate-music", offchain_request(None)).await;
    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;

    assert_eq!(job.status, JobStatus::TimedOut);
    assert_eq!(job.attempts, 5);
    assert_eq!(job.provider_status.as_deref(), Some("TEXT_SUCCESS"));
    assert!(job.refund.unwrap().refunded);

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
}

#[tokio::test]
async fn test_rejected_submission_restores_credit() {
    let app = app_with_suno(fake_suno(429, "PENDING").await).await;

    let (status, body) = app.post("/api/generate-music", offchain_request(None)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
}

#[tokio::test]
async fn test_generation_unavailable_without_api_key() {
    let app = TestApp::new(|_| {}).await;

    let (status, _) = app.post("/api/generate-music", offchain_request(None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
}

#[tokio::test]
async fn test_invalid_request_is_not_charged() {
    let app = app_with_suno(fake_suno(200, "SUCCESS").await).await;

    let mut request = offchain_request(None);
    request["prompt"] = json!("   ");
    let (status, _) = app.post("/api/generate-music", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = offchain_request(None);
    request["title"] = json!("t".repeat(81));
    let (status, _) = app.post("/api/generate-music", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
}

#[tokio::test]
async fn test_onchain_payment_refunds_through_contract() {
    let chain = Arc::new(FakeChain::default());
    chain.add_credit_use(&tx(1), &addr(5), 1);
    chain.add_credit_use(&tx(2), &addr(6), 1);

    let app = app_with_suno(fake_suno(200, "GENERATE_AUDIO_FAILED").await)
        .await
        .with_chain(chain.clone());

    let request = |hash: String| {
        json!({
            "prompt": "ambient rain",
            "payer": { "onchain": { "address": addr(5), "tx_hash": hash } },
        })
    };

    // Someone else's transaction
    let (status, _) = app.post("/api/generate-music", request(tx(2))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown transaction
    let (status, _) = app.post("/api/generate-music", request(tx(3))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/api/generate-music", request(tx(1))).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", body);

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.owner.as_deref(), Some(addr(5).as_str()));
    let refund = job.refund.unwrap();
    assert!(refund.refunded);
    assert_eq!(refund.tx_hash, Some(tx(0xee)));
    assert_eq!(*chain.refunds.lock().unwrap(), vec![(addr(5), 1u64)]);

    // A transaction pays for one generation only
    let (status, body) = app.post("/api/generate-music", request(tx(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_partial_download_leaves_no_tracks() {
    let app = app_with_suno(fake_suno(200, "SUCCESS_PARTIAL").await).await;

    let (status, body) = app.post("/api/generate-music", offchain_request(Some(addr(1)))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.track_ids.is_empty());
    assert!(job.refund.unwrap().refunded);

    let (_, tracks) = app.get(&format!("/api/tracks?owner={}", addr(1))).await;
    assert_eq!(tracks.as_array().unwrap().len(), 0);
    assert_eq!(app.state.tables.tracks.list().await.unwrap().len(), 0);

    // The first clip downloaded fine but must not outlive the failed job
    let leftovers = std::fs::read_dir(&app.state.audio_dir).unwrap().count();
    assert_eq!(leftovers, 0);

    let (_, balance) = app.get("/api/credits/fingerprint/fp-1").await;
    assert_eq!(balance["credits"], 3);
}

#[tokio::test]
async fn test_pinning_failure_keeps_local_track() {
    let suno_url = fake_suno(200, "SUCCESS").await;
    let pinata_url = failing_pinata().await;
    let app = TestApp::new(move |config| {
        config.suno.base_url = suno_url;
        config.suno.api_key = Some("test-key".to_string());
        config.suno.poll_interval_ms = 10;
        config.suno.max_poll_attempts = 5;
        config.suno.requests_per_second = 1000;
        config.ipfs.api_url = pinata_url;
        config.ipfs.jwt = Some("test-jwt".to_string());
    })
    .await;

    let (_, body) = app.post("/api/generate-music", offchain_request(Some(addr(1)))).await;
    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.refund.is_none());

    let (_, tracks) = app.get(&format!("/api/tracks?owner={}", addr(1))).await;
    assert_eq!(tracks.as_array().unwrap().len(), 1);
    assert!(tracks[0]["ipfs_cid"].is_null());
    assert!(app.state.audio_dir.join(format!("{}-0.mp3", job.id)).exists());
}

#[tokio::test]
async fn test_resume_picks_up_unfinished_jobs() {
    let app = app_with_suno(fake_suno(200, "SUCCESS").await).await;
    let job = seed_job(&app, 2).await;

    assert_eq!(resume_unfinished(&app.state).await.unwrap(), 1);

    let finished = app.wait_for_job(&job.id.to_string()).await;
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.track_ids.len(), 1);

    let (_, tracks) = app.get(&format!("/api/tracks?owner={}", addr(4))).await;
    assert_eq!(tracks.as_array().unwrap().len(), 1);

    // Terminal jobs are left alone
    assert_eq!(resume_unfinished(&app.state).await.unwrap(), 0);
}

#[tokio::test]
async fn test_resumed_job_keeps_its_attempt_budget() {
    let app = app_with_suno(fake_suno(200, "TEXT_SUCCESS").await).await;

    let spent = seed_job(&app, 5).await;
    let partial = seed_job(&app, 3).await;
    assert_eq!(resume_unfinished(&app.state).await.unwrap(), 2);

    let spent = app.wait_for_job(&spent.id.to_string()).await;
    assert_eq!(spent.status, JobStatus::TimedOut);
    assert_eq!(spent.attempts, 5);
    assert!(spent.refund.unwrap().refunded);

    let partial = app.wait_for_job(&partial.id.to_string()).await;
    assert_eq!(partial.status, JobStatus::TimedOut);
    assert_eq!(partial.attempts, 5);
}

#[tokio::test]
async fn test_transaction_kind_must_match_its_use() {
    let chain = Arc::new(FakeChain::default());
    chain.add_purchase(&tx(1), &addr(5), 10);
    chain.add_credit_use(&tx(2), &addr(5), 1);
    chain.add_credit_use(&tx(3), &addr(5), 0);

    let app = app_with_suno(fake_suno(200, "SUCCESS").await)
        .await
        .with_chain(chain);

    let generate = |hash: String| {
        json!({
            "prompt": "ambient rain",
            "payer": { "onchain": { "address": addr(5), "tx_hash": hash } },
        })
    };
    let verify = |hash: String, credits: u64| {
        json!({ "tx_hash": hash, "address": addr(5), "credits": credits })
    };

    // A purchase is recorded once and cannot also pay for a generation
    let (status, _) = app.post("/api/payment/verify", verify(tx(1), 10)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.post("/api/generate-music", generate(tx(1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    // A credit spend is not a purchase
    let (status, _) = app.post("/api/payment/verify", verify(tx(2), 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Spending zero credits pays for nothing
    let (status, _) = app.post("/api/generate-music", generate(tx(3))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/api/generate-music", generate(tx(2))).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", body);
    let (status, _) = app.post("/api/generate-music", generate(tx(2))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new(|_| {}).await;
    let (status, _) = app
        .get("/api/generate-music/00000000-0000-0000-0000-000000000000")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
