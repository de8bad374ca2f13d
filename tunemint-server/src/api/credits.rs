//! Free-credit ledgers and on-chain credit lookups

use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tunemint_common::models::{CreditAccount, LedgerKind};
use tunemint_common::wallet::normalize_address;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub kind: LedgerKind,
    pub id: String,
    pub credits: u64,
    pub total_used: u64,
    pub total_claimed: u64,
    pub total_refunded: u64,
    pub last_claim_at: Option<DateTime<Utc>>,
    /// `None` when a claim is possible now
    pub next_claim_at: Option<DateTime<Utc>>,
}

impl BalanceResponse {
    fn new(kind: LedgerKind, id: String, account: CreditAccount, cooldown_hours: i64) -> Self {
        Self {
            next_claim_at: account.next_claim_at(Duration::hours(cooldown_hours), Utc::now()),
            kind,
            id,
            credits: account.credits,
            total_used: account.total_used,
            total_claimed: account.total_claimed,
            total_refunded: account.total_refunded,
            last_claim_at: account.last_claim_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UseRequest {
    pub kind: LedgerKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_amount")]
    pub amount: u64,
}

fn default_amount() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub kind: LedgerKind,
    #[serde(default)]
    pub id: Option<String>,
}

/// Caller IP: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket
pub fn client_ip(headers: &HeaderMap, connect: Option<&SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| header("x-real-ip").map(str::to_string))
        .or_else(|| connect.map(|addr| addr.ip().to_string()))
}

/// Ledger key for a request; an `ip` request without an id uses the caller IP
fn resolve_id(
    kind: LedgerKind,
    id: Option<String>,
    headers: &HeaderMap,
    connect: Option<&SocketAddr>,
) -> ApiResult<String> {
    match id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(id) => Ok(id),
        None if kind == LedgerKind::Ip => client_ip(headers, connect)
            .ok_or_else(|| ApiError::BadRequest("Cannot determine client IP".to_string())),
        None => Err(ApiError::BadRequest(format!("An id is required for {} credits", kind))),
    }
}

fn parse_kind(kind: &str) -> ApiResult<LedgerKind> {
    kind.parse::<LedgerKind>().map_err(ApiError::from)
}

/// GET /api/credits/:kind/:id
pub async fn balance(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<BalanceResponse>> {
    let kind = parse_kind(&kind)?;
    let account = state.credits.balance(kind, &id).await?;
    let cooldown = state.credits.policy().claim_cooldown_hours;
    Ok(Json(BalanceResponse::new(kind, id, account, cooldown)))
}

/// GET /api/credits/:kind
///
/// Only meaningful for `ip`: the ledger key is the caller's address.
pub async fn own_balance(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Json<BalanceResponse>> {
    let kind = parse_kind(&kind)?;
    let id = resolve_id(kind, None, &headers, connect.as_ref().map(|c| &c.0))?;
    let account = state.credits.balance(kind, &id).await?;
    let cooldown = state.credits.policy().claim_cooldown_hours;
    Ok(Json(BalanceResponse::new(kind, id, account, cooldown)))
}

/// POST /api/credits/use
pub async fn use_credits(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<UseRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = resolve_id(req.kind, req.id, &headers, connect.as_ref().map(|c| &c.0))?;
    let remaining = state.credits.deduct(req.kind, &id, req.amount).await?;
    Ok(Json(serde_json::json!({
        "kind": req.kind,
        "id": id,
        "used": req.amount,
        "credits": remaining,
    })))
}

/// POST /api/credits/claim
pub async fn claim_credits(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let id = resolve_id(req.kind, req.id, &headers, connect.as_ref().map(|c| &c.0))?;
    state.credits.claim(req.kind, &id).await?;
    let account = state.credits.balance(req.kind, &id).await?;
    let cooldown = state.credits.policy().claim_cooldown_hours;
    Ok(Json(BalanceResponse::new(req.kind, id, account, cooldown)))
}

/// GET /api/credits/onchain/:address
pub async fn onchain_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let address = normalize_address(&address)?;
    let chain = state
        .chain
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Chain access is not configured".to_string()))?;

    let credits = chain.credit_balance(&address).await?;
    Ok(Json(serde_json::json!({ "address": address, "credits": credits })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_precedence() {
        let socket: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(&socket)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(client_ip(&headers, Some(&socket)).as_deref(), Some("192.0.2.7"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(&socket)).as_deref(), Some("203.0.113.5"));

        assert!(client_ip(&HeaderMap::new(), None).is_none());
    }

    #[test]
    fn test_resolve_id_requires_id_except_for_ip() {
        let headers = HeaderMap::new();
        let socket: SocketAddr = "127.0.0.1:1".parse().unwrap();

        assert_eq!(
            resolve_id(LedgerKind::Ip, None, &headers, Some(&socket)).unwrap(),
            "127.0.0.1"
        );
        assert!(resolve_id(LedgerKind::Fingerprint, Some(" ".to_string()), &headers, None).is_err());
        assert_eq!(
            resolve_id(LedgerKind::Google, Some("uid".to_string()), &headers, None).unwrap(),
            "uid"
        );
    }
}
