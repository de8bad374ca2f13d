//! tunemint-server library
//!
//! HTTP API for the TuneMint music platform: credit ledgers, Suno
//! generation with background monitoring, IPFS minting, and the community
//! layer (profiles, chat, likes, follows, sharing, marketplace).

use axum::Router;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use tunemint_common::config::TomlConfig;
use tunemint_common::events::EventBus;
use tunemint_common::models::{
    ChatLog, FollowGraph, GeneratedTrack, GenerationJob, LikeBook, Listing, PaymentRecord,
    Profile, SharedTrack, UserDirectory, WhitelistEntry,
};
use tunemint_common::{Collection, Document, JsonStore};

pub mod api;
pub mod error;
pub mod services;

use services::{
    ChainGateway, CreditService, FixedWindowLimiter, IpfsClient, JsonRpcChain, PriceOracle,
    SunoClient,
};

const EVENT_BUS_CAPACITY: usize = 256;

/// Every persisted table
///
/// Whole-file documents are used wherever a write must check other records
/// (uniqueness, one active listing per track); per-record collections
/// everywhere else.
#[derive(Clone)]
pub struct Tables {
    pub users: Document<UserDirectory>,
    pub profiles: Collection<Profile>,
    pub chat: Document<ChatLog>,
    pub likes: Document<LikeBook>,
    pub follows: Document<FollowGraph>,
    pub shares: Document<BTreeMap<Uuid, SharedTrack>>,
    pub listings: Document<BTreeMap<Uuid, Listing>>,
    /// Keyed by transaction hash
    pub payments: Document<BTreeMap<String, PaymentRecord>>,
    /// Credit-use transactions already redeemed for a generation
    pub redeemed_txs: Document<BTreeSet<String>>,
    /// Keyed by address
    pub whitelist: Document<BTreeMap<String, WhitelistEntry>>,
    pub jobs: Collection<GenerationJob>,
    pub tracks: Collection<GeneratedTrack>,
}

impl Tables {
    pub async fn open(store: &JsonStore) -> tunemint_common::Result<Self> {
        Ok(Self {
            users: store.document("users"),
            profiles: store.collection("profiles").await?,
            chat: store.document("chat"),
            likes: store.document("likes"),
            follows: store.document("follows"),
            shares: store.document("shared_tracks"),
            listings: store.document("listings"),
            payments: store.document("payments"),
            redeemed_txs: store.document("redeemed_txs"),
            whitelist: store.document("whitelist"),
            jobs: store.collection("jobs").await?,
            tracks: store.collection("tracks").await?,
        })
    }
}

/// Application state shared across HTTP handlers and background tasks
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TomlConfig>,
    pub store: JsonStore,
    pub tables: Tables,
    pub event_bus: EventBus,
    pub credits: CreditService,
    /// Generation requests per payer
    pub gen_limiter: FixedWindowLimiter,
    /// Chat posts per sender
    pub chat_limiter: FixedWindowLimiter,
    /// `None` without an API key
    pub suno: Option<Arc<SunoClient>>,
    /// `None` without a Pinata JWT
    pub ipfs: Option<Arc<IpfsClient>>,
    pub oracle: Arc<PriceOracle>,
    /// `None` unless RPC URL, contract and operator are configured
    pub chain: Option<Arc<dyn ChainGateway>>,
    /// Plain client for audio downloads
    pub http_client: reqwest::Client,
    pub audio_dir: PathBuf,
    pub startup_time: Instant,
}

impl AppState {
    /// Open the store under the configured data directory and build the clients
    pub async fn new(config: TomlConfig) -> anyhow::Result<Self> {
        let data_dir = config.resolve_data_dir();
        let store = JsonStore::open(&data_dir).await?;
        let tables = Tables::open(&store).await?;

        let audio_dir = data_dir.join("audio");
        tokio::fs::create_dir_all(&audio_dir).await?;

        let suno = SunoClient::from_config(&config.suno)?.map(Arc::new);
        let ipfs = IpfsClient::from_config(&config.ipfs)?.map(Arc::new);
        let oracle = Arc::new(PriceOracle::new(&config.oracle)?);
        let chain = JsonRpcChain::from_config(&config.chain)?
            .map(|c| Arc::new(c) as Arc<dyn ChainGateway>);

        info!(
            data_dir = %data_dir.display(),
            suno = suno.is_some(),
            ipfs = ipfs.is_some(),
            chain = chain.is_some(),
            "Application state ready"
        );

        let window = Duration::from_secs(config.rate_limit.window_secs);
        let max_requests = config.rate_limit.max_requests;

        Ok(Self {
            credits: CreditService::new(&store, config.credits.clone()),
            gen_limiter: FixedWindowLimiter::new(max_requests, window),
            chat_limiter: FixedWindowLimiter::new(max_requests, window),
            config: Arc::new(config),
            store,
            tables,
            event_bus: EventBus::new(EVENT_BUS_CAPACITY),
            suno,
            ipfs,
            oracle,
            chain,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            audio_dir,
            startup_time: Instant::now(),
        })
    }

    /// Replace the chain gateway (alternative backends, tests)
    pub fn with_chain(mut self, chain: Arc<dyn ChainGateway>) -> Self {
        self.chain = Some(chain);
        self
    }
}

/// Build application router
///
/// Admin routes sit behind the signed-request middleware; everything else is
/// public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let admin = api::admin_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        api::auth_middleware,
    ));

    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::credit_routes())
        .merge(api::community_routes())
        .merge(api::share_routes())
        .merge(api::trade_routes())
        .merge(api::generation_routes())
        .merge(api::mint_routes())
        .merge(api::payment_routes())
        .merge(api::whitelist_routes())
        .merge(admin)
        .nest_service("/audio", ServeDir::new(&state.audio_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
