//! Credit purchase quotes and on-chain payment verification

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tunemint_common::models::PaymentRecord;
use tunemint_common::wallet::{normalize_address, normalize_tx_hash};
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::services::chain::{redeem_transaction, verify_transaction, PURCHASE_CREDITS};
use crate::AppState;

const MAX_CREDITS_PER_PURCHASE: u64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub credits: u64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Quote {
    pub credits: u64,
    pub usd: f64,
    pub eth: f64,
    pub eth_usd: f64,
}

impl Quote {
    pub fn compute(credits: u64, usd_per_credit: f64, eth_usd: f64) -> Self {
        let usd = credits as f64 * usd_per_credit;
        Self {
            credits,
            usd,
            eth: usd / eth_usd,
            eth_usd,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub tx_hash: String,
    pub address: String,
    pub credits: u64,
}

fn check_credit_amount(credits: u64) -> ApiResult<()> {
    if credits == 0 || credits > MAX_CREDITS_PER_PURCHASE {
        return Err(ApiError::BadRequest(format!(
            "Credits must be between 1 and {}",
            MAX_CREDITS_PER_PURCHASE
        )));
    }
    Ok(())
}

/// GET /api/payment/quote?credits=N
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Json<Quote>> {
    check_credit_amount(query.credits)?;
    let eth_usd = state.oracle.eth_usd().await?;
    Ok(Json(Quote::compute(
        query.credits,
        state.config.payment.usd_per_credit,
        eth_usd,
    )))
}

/// POST /api/payment/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<(StatusCode, Json<PaymentRecord>)> {
    check_credit_amount(req.credits)?;
    let address = normalize_address(&req.address)?;
    let tx_hash = normalize_tx_hash(&req.tx_hash)?;
    let chain = state
        .chain
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Chain access is not configured".to_string()))?;

    let call = verify_transaction(chain.as_ref(), &tx_hash, &address, PURCHASE_CREDITS).await?;
    if call.argument != req.credits {
        return Err(ApiError::BadRequest(format!(
            "Transaction {} purchased {} credits, not {}",
            tx_hash, call.argument, req.credits
        )));
    }
    redeem_transaction(&state.tables.redeemed_txs, &tx_hash).await?;

    let record = PaymentRecord {
        tx_hash: tx_hash.clone(),
        address,
        credits: req.credits,
        block_number: call.receipt.block_number,
        recorded_at: Utc::now(),
    };

    let stored = record.clone();
    state
        .tables
        .payments
        .update(move |payments| {
            if payments.contains_key(&stored.tx_hash) {
                return Err(Error::Conflict(format!(
                    "Payment {} already recorded",
                    stored.tx_hash
                )));
            }
            payments.insert(stored.tx_hash.clone(), stored);
            Ok(())
        })
        .await?;

    info!(tx_hash = %tx_hash, address = %record.address, credits = record.credits, "Payment recorded");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/payment/history/:address
pub async fn payment_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    let address = normalize_address(&address)?;
    let mut records: Vec<PaymentRecord> = state
        .tables
        .payments
        .load()
        .await?
        .into_values()
        .filter(|p| p.address == address)
        .collect();
    records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    Ok(Json(records))
}
