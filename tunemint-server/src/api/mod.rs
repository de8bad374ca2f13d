//! HTTP API handlers for tunemint-server

pub mod admin;
pub mod auth;
pub mod buildinfo;
pub mod chat;
pub mod credits;
pub mod follow;
pub mod generate;
pub mod health;
pub mod like;
pub mod mint;
pub mod payment;
pub mod profile;
pub mod share;
pub mod sse;
pub mod trade;
pub mod whitelist;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

use crate::AppState;

pub use admin::{admin_routes, auth_middleware};
pub use buildinfo::get_build_info;
pub use health::health_check;
pub use sse::event_stream;

/// Health, build info and the event stream (no auth)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/buildinfo", get(get_build_info))
        .route("/api/events", get(event_stream))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
}

pub fn credit_routes() -> Router<AppState> {
    Router::new()
        .route("/api/credits/use", post(credits::use_credits))
        .route("/api/credits/claim", post(credits::claim_credits))
        .route("/api/credits/onchain/:address", get(credits::onchain_balance))
        .route("/api/credits/:kind", get(credits::own_balance))
        .route("/api/credits/:kind/:id", get(credits::balance))
}

/// Profiles, chat, follows and likes
pub fn community_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/community/profile",
            put(profile::update_profile).layer(DefaultBodyLimit::max(profile::MAX_BODY_BYTES)),
        )
        .route("/api/community/profile/:address", get(profile::get_profile))
        .route("/api/community/profiles", get(profile::list_profiles))
        .route("/api/community/chat", get(chat::get_messages).post(chat::post_message))
        .route("/api/community/follow", post(follow::toggle_follow))
        .route("/api/community/follow/:address", get(follow::get_follows))
        .route("/api/community/like", post(like::toggle_like))
        .route("/api/community/like/:track_id", get(like::get_likes))
}

pub fn share_routes() -> Router<AppState> {
    Router::new()
        .route("/api/share-music", post(share::share_track).get(share::list_shared))
        .route("/api/share-music/:id", delete(share::unshare_track))
        .route("/api/share-music/:id/play", post(share::record_play))
}

pub fn trade_routes() -> Router<AppState> {
    Router::new()
        .route("/api/trade/listings", post(trade::create_listing).get(trade::list_listings))
        .route("/api/trade/listings/:id", delete(trade::cancel_listing))
        .route("/api/trade/listings/:id/buy", post(trade::buy_listing))
        .route("/api/marketplace/stats", get(trade::marketplace_stats))
}

pub fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/generate-music", post(generate::generate_music))
        .route("/api/generate-music/:job_id", get(generate::get_job))
        .route("/api/tracks", get(generate::list_tracks))
        .route("/api/tracks/:id", get(generate::get_track))
}

pub fn mint_routes() -> Router<AppState> {
    Router::new().route("/api/mint-nft", post(mint::mint_nft))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/payment/quote", get(payment::quote))
        .route("/api/payment/verify", post(payment::verify_payment))
        .route("/api/payment/history/:address", get(payment::payment_history))
}

pub fn whitelist_routes() -> Router<AppState> {
    Router::new()
        .route("/api/whitelist", post(whitelist::register))
        .route("/api/whitelist/check/:address", get(whitelist::check))
}
