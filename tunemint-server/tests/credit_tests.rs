//! Integration tests for the off-chain credit ledgers

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::{addr, FakeChain, TestApp};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_new_identifier_gets_initial_credits() {
    let app = TestApp::new(|_| {}).await;

    let (status, body) = app.get("/api/credits/fingerprint/fp-123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "fingerprint");
    assert_eq!(body["id"], "fp-123");
    assert_eq!(body["credits"], 3);
    assert!(body["next_claim_at"].is_null());
}

#[tokio::test]
async fn test_use_credits_until_exhausted() {
    let app = TestApp::new(|_| {}).await;

    let (status, body) = app
        .post("/api/credits/use", json!({ "kind": "google", "id": "uid-1", "amount": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 2);
    assert_eq!(body["credits"], 1);

    let (status, body) = app
        .post("/api/credits/use", json!({ "kind": "google", "id": "uid-1", "amount": 2 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_CREDITS");

    // Failed deduction left the balance alone
    let (_, body) = app.get("/api/credits/google/uid-1").await;
    assert_eq!(body["credits"], 1);
    assert_eq!(body["total_used"], 2);
}

#[tokio::test]
async fn test_ledgers_are_independent() {
    let app = TestApp::new(|_| {}).await;

    app.post("/api/credits/use", json!({ "kind": "fingerprint", "id": "shared", "amount": 3 }))
        .await;

    let (_, body) = app.get("/api/credits/google/shared").await;
    assert_eq!(body["credits"], 3);
    let (_, body) = app.get("/api/credits/fingerprint/shared").await;
    assert_eq!(body["credits"], 0);
}

#[tokio::test]
async fn test_claim_respects_cooldown() {
    let app = TestApp::new(|_| {}).await;

    let (status, body) = app
        .post("/api/credits/claim", json!({ "kind": "fingerprint", "id": "fp" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credits"], 4);
    assert_eq!(body["total_claimed"], 1);
    assert!(body["next_claim_at"].is_string());

    let (status, body) = app
        .post("/api/credits/claim", json!({ "kind": "fingerprint", "id": "fp" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_ip_ledger_uses_forwarded_address() {
    let app = TestApp::new(|_| {}).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/credits/use")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
        .body(Body::from(json!({ "kind": "ip" }).to_string()))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "203.0.113.5");
    assert_eq!(body["credits"], 2);

    let request = Request::builder()
        .uri("/api/credits/ip")
        .header("x-real-ip", "203.0.113.5")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credits"], 2);
}

#[tokio::test]
async fn test_non_ip_ledger_requires_id() {
    let app = TestApp::new(|_| {}).await;

    let (status, _) = app.post("/api/credits/use", json!({ "kind": "google" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/credits/unknown/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_onchain_balance() {
    let app = TestApp::new(|_| {}).await;
    let (status, body) = app.get(&format!("/api/credits/onchain/{}", addr(1))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "UNAVAILABLE");

    let chain = Arc::new(FakeChain::default());
    chain.balances.lock().unwrap().insert(addr(1), 12);
    let app = app.with_chain(chain);

    let (status, body) = app.get(&format!("/api/credits/onchain/{}", addr(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credits"], 12);

    let (status, _) = app.get("/api/credits/onchain/not-an-address").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
