//! Shared fixtures for tunemint-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use tunemint_common::config::TomlConfig;
use tunemint_common::models::{GeneratedTrack, GenerationJob};
use tunemint_server::services::chain::{
    encode_call, encode_uint, PURCHASE_CREDITS, USE_CREDITS,
};
use tunemint_server::services::{ChainError, ChainGateway, TxReceipt};
use tunemint_server::{build_router, AppState};
use uuid::Uuid;

pub const CONTRACT: &str = "0x1111111111111111111111111111111111111111";

/// Deterministic wallet address ending in `n`
pub fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}

/// Deterministic transaction hash ending in `n`
pub fn tx(n: u8) -> String {
    format!("0x{:064x}", n)
}

pub struct TestApp {
    /// Keeps the data directory alive for the duration of the test
    pub dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    /// App on a fresh data directory; `configure` adjusts the defaults
    pub async fn new(configure: impl FnOnce(&mut TomlConfig)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = TomlConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        configure(&mut config);

        let state = AppState::new(config).await.expect("app state");
        Self::from_state(dir, state)
    }

    pub fn from_state(dir: TempDir, state: AppState) -> Self {
        let router = build_router(state.clone());
        Self { dir, state, router }
    }

    /// Swap in a chain gateway and rebuild the router
    pub fn with_chain(self, chain: Arc<dyn ChainGateway>) -> Self {
        let state = self.state.with_chain(chain);
        Self::from_state(self.dir, state)
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    /// Store a generated track directly, as the monitor would
    pub async fn insert_track(&self, owner: &str) -> GeneratedTrack {
        let id = Uuid::new_v4();
        let track = GeneratedTrack {
            id,
            job_id: Uuid::new_v4(),
            owner: Some(owner.to_string()),
            title: "Test Track".to_string(),
            style: "lofi".to_string(),
            prompt: "rainy night".to_string(),
            filename: format!("{}.mp3", id),
            source_url: "http://provider/a.mp3".to_string(),
            image_url: None,
            duration_secs: Some(90.0),
            ipfs_cid: None,
            token_uri: None,
            created_at: chrono::Utc::now(),
        };
        self.state
            .tables
            .tracks
            .put(&id.to_string(), &track)
            .await
            .expect("put track");
        track
    }

    /// Poll the job endpoint until the job reaches a terminal status
    pub async fn wait_for_job(&self, job_id: &str) -> GenerationJob {
        for _ in 0..250 {
            let (status, body) = self.get(&format!("/api/generate-music/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK, "job lookup failed: {}", body);
            let job: GenerationJob = serde_json::from_value(body).expect("job json");
            if job.status.is_terminal() && (job.refund.is_some() || !job.track_ids.is_empty()) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not finish", job_id);
    }
}

/// Serve `router` on an ephemeral local port; returns the base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake server");
    });
    format!("http://{}", addr)
}

/// In-memory credit contract
#[derive(Default)]
pub struct FakeChain {
    pub receipts: Mutex<HashMap<String, TxReceipt>>,
    pub inputs: Mutex<HashMap<String, String>>,
    pub balances: Mutex<HashMap<String, u64>>,
    pub refunds: Mutex<Vec<(String, u64)>>,
    pub fail_refunds: bool,
}

impl FakeChain {
    /// Register a mined `purchaseCredits(credits)` call from `from`
    pub fn add_purchase(&self, tx_hash: &str, from: &str, credits: u64) {
        self.add_call(tx_hash, from, encode_call(PURCHASE_CREDITS, &[encode_uint(credits)]));
    }

    /// Register a mined `useCredits(credits)` call from `from`
    pub fn add_credit_use(&self, tx_hash: &str, from: &str, credits: u64) {
        self.add_call(tx_hash, from, encode_call(USE_CREDITS, &[encode_uint(credits)]));
    }

    /// Register a successful contract call from `from` with raw calldata
    pub fn add_call(&self, tx_hash: &str, from: &str, input: String) {
        self.inputs.lock().unwrap().insert(tx_hash.to_string(), input);
        self.receipts.lock().unwrap().insert(
            tx_hash.to_string(),
            TxReceipt {
                tx_hash: tx_hash.to_string(),
                from: from.to_string(),
                to: Some(CONTRACT.to_string()),
                success: true,
                block_number: Some(100),
            },
        );
    }
}

#[async_trait]
impl ChainGateway for FakeChain {
    async fn credit_balance(&self, address: &str) -> Result<u64, ChainError> {
        Ok(*self.balances.lock().unwrap().get(address).unwrap_or(&0))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }

    async fn transaction_input(&self, tx_hash: &str) -> Result<Option<String>, ChainError> {
        Ok(self.inputs.lock().unwrap().get(tx_hash).cloned())
    }

    async fn refund_credits(&self, address: &str, amount: u64) -> Result<String, ChainError> {
        if self.fail_refunds {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "operator locked".to_string(),
            });
        }
        self.refunds.lock().unwrap().push((address.to_string(), amount));
        Ok(tx(0xee))
    }

    async fn withdraw(&self) -> Result<String, ChainError> {
        Ok(tx(0xdd))
    }

    fn contract_address(&self) -> &str {
        CONTRACT
    }
}
