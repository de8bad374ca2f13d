//! Marketplace listings and statistics
//!
//! Listings are off-chain records: a sale marks the listing sold and records
//! the buyer. Settlement happens between the wallets.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;
use uuid::Uuid;

use tunemint_common::events::AppEvent;
use tunemint_common::models::{Currency, Listing, SharedTrack};
use tunemint_common::wallet::normalize_address;
use tunemint_common::Error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateListing {
    pub track_id: Uuid,
    pub seller: String,
    pub price: f64,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub active: Option<bool>,
    pub seller: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub buyer: String,
}

#[derive(Debug, Deserialize)]
pub struct SellerBody {
    pub seller: String,
}

/// POST /api/trade/listings
pub async fn create_listing(
    State(state): State<AppState>,
    Json(req): Json<CreateListing>,
) -> ApiResult<(StatusCode, Json<Listing>)> {
    let seller = normalize_address(&req.seller)?;
    if !(req.price.is_finite() && req.price > 0.0) {
        return Err(ApiError::BadRequest("Price must be positive".to_string()));
    }

    let shares = state.tables.shares.load().await?;
    let shared = shares
        .values()
        .find(|s| s.track_id == req.track_id && s.owner == seller)
        .ok_or_else(|| {
            ApiError::Forbidden(format!("{} has no shared track {}", seller, req.track_id))
        })?;

    let listing = Listing {
        id: Uuid::new_v4(),
        track_id: req.track_id,
        seller,
        title: shared.title.clone(),
        style: shared.style.clone(),
        filename: shared.filename.clone(),
        price: req.price,
        currency: req.currency,
        sold: false,
        buyer: None,
        created_at: Utc::now(),
        sold_at: None,
    };

    let record = listing.clone();
    state
        .tables
        .listings
        .update(move |listings| {
            if listings
                .values()
                .any(|l| l.track_id == record.track_id && l.is_active())
            {
                return Err(Error::Conflict(format!(
                    "Track {} already has an active listing",
                    record.track_id
                )));
            }
            listings.insert(record.id, record);
            Ok(())
        })
        .await?;

    info!(listing_id = %listing.id, price = listing.price, currency = %listing.currency, "Listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

/// GET /api/trade/listings
///
/// Newest first. `active=true` hides sold listings, `active=false` shows
/// only sold ones.
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Json<Vec<Listing>>> {
    let seller = query.seller.as_deref().map(normalize_address).transpose()?;

    let mut listings: Vec<Listing> = state
        .tables
        .listings
        .load()
        .await?
        .into_values()
        .filter(|l| query.active.map_or(true, |active| l.is_active() == active))
        .filter(|l| seller.as_ref().map_or(true, |s| &l.seller == s))
        .collect();
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(listings))
}

/// POST /api/trade/listings/:id/buy
pub async fn buy_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BuyRequest>,
) -> ApiResult<Json<Listing>> {
    let buyer = normalize_address(&req.buyer)?;

    let listing = state
        .tables
        .listings
        .update(|listings| {
            let listing = listings
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Listing {}", id)))?;
            if listing.sold {
                return Err(Error::Conflict(format!("Listing {} is already sold", id)));
            }
            if listing.seller == buyer {
                return Err(Error::InvalidInput("Cannot buy your own listing".to_string()));
            }
            listing.sold = true;
            listing.buyer = Some(buyer.clone());
            listing.sold_at = Some(Utc::now());
            Ok(listing.clone())
        })
        .await?;

    info!(listing_id = %id, buyer = %buyer, "Listing sold");
    state.event_bus.emit_lossy(AppEvent::ListingSold {
        listing_id: id,
        buyer,
        price: listing.price,
        currency: listing.currency,
        timestamp: listing.sold_at.unwrap_or_else(Utc::now),
    });

    Ok(Json(listing))
}

/// DELETE /api/trade/listings/:id
pub async fn cancel_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SellerBody>,
) -> ApiResult<StatusCode> {
    let seller = normalize_address(&body.seller)?;

    // Ok(false): the listing belongs to someone else
    let removed = state
        .tables
        .listings
        .update(|listings| {
            let Some(listing) = listings.get(&id) else {
                return Err(Error::NotFound(format!("Listing {}", id)));
            };
            if listing.seller != seller {
                return Ok(false);
            }
            if listing.sold {
                return Err(Error::Conflict(format!("Listing {} is already sold", id)));
            }
            listings.remove(&id);
            Ok(true)
        })
        .await?;

    if !removed {
        return Err(ApiError::Forbidden(format!("{} is not the seller", seller)));
    }
    info!(listing_id = %id, "Listing cancelled");
    Ok(StatusCode::NO_CONTENT)
}

/// Aggregate marketplace figures
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct MarketStats {
    pub total_listings: usize,
    pub active_listings: usize,
    pub sold_listings: usize,
    pub unique_sellers: usize,
    /// Sum of sold prices per currency
    pub volume: BTreeMap<Currency, f64>,
    /// Cheapest active price per currency
    pub floor_price: BTreeMap<Currency, f64>,
    pub shared_tracks: usize,
    pub total_plays: u64,
}

impl MarketStats {
    pub fn compute<'a>(
        listings: impl IntoIterator<Item = &'a Listing>,
        shares: impl IntoIterator<Item = &'a SharedTrack>,
    ) -> Self {
        let mut stats = MarketStats::default();
        let mut sellers = BTreeSet::new();

        for listing in listings {
            stats.total_listings += 1;
            sellers.insert(listing.seller.as_str());
            if listing.sold {
                stats.sold_listings += 1;
                *stats.volume.entry(listing.currency).or_insert(0.0) += listing.price;
            } else {
                stats.active_listings += 1;
                let floor = stats
                    .floor_price
                    .entry(listing.currency)
                    .or_insert(listing.price);
                *floor = floor.min(listing.price);
            }
        }
        stats.unique_sellers = sellers.len();

        for shared in shares {
            stats.shared_tracks += 1;
            stats.total_plays += shared.plays;
        }
        stats
    }
}

/// GET /api/marketplace/stats
pub async fn marketplace_stats(State(state): State<AppState>) -> ApiResult<Json<MarketStats>> {
    let listings = state.tables.listings.load().await?;
    let shares = state.tables.shares.load().await?;
    Ok(Json(MarketStats::compute(listings.values(), shares.values())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(seller: &str, price: f64, currency: Currency, sold: bool) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            track_id: Uuid::new_v4(),
            seller: seller.to_string(),
            title: "t".to_string(),
            style: "s".to_string(),
            filename: "f.mp3".to_string(),
            price,
            currency,
            sold,
            buyer: None,
            created_at: Utc::now(),
            sold_at: None,
        }
    }

    #[test]
    fn test_stats_volume_and_floor() {
        let listings = vec![
            listing("0xa", 1.0, Currency::Eth, true),
            listing("0xa", 0.5, Currency::Eth, false),
            listing("0xb", 0.2, Currency::Eth, false),
            listing("0xb", 30.0, Currency::Usdc, true),
        ];
        let stats = MarketStats::compute(&listings, &Vec::<SharedTrack>::new());

        assert_eq!(stats.total_listings, 4);
        assert_eq!(stats.active_listings, 2);
        assert_eq!(stats.sold_listings, 2);
        assert_eq!(stats.unique_sellers, 2);
        assert_eq!(stats.volume[&Currency::Eth], 1.0);
        assert_eq!(stats.volume[&Currency::Usdc], 30.0);
        assert_eq!(stats.floor_price[&Currency::Eth], 0.2);
        assert!(!stats.floor_price.contains_key(&Currency::Usdc));
    }

    #[test]
    fn test_stats_serialize_currency_keys() {
        let listings = [listing("0xa", 2.0, Currency::Credits, false)];
        let stats = MarketStats::compute(&listings, &Vec::<SharedTrack>::new());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["floor_price"]["CREDITS"], 2.0);
    }
}
