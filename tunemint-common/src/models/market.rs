//! Shared tracks, marketplace listings, payments and the whitelist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Currency a listing is priced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eth,
    Usdc,
    Credits,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eth => "ETH",
            Currency::Usdc => "USDC",
            Currency::Credits => "CREDITS",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ETH" => Ok(Currency::Eth),
            "USDC" => Ok(Currency::Usdc),
            "CREDITS" => Ok(Currency::Credits),
            other => Err(Error::InvalidInput(format!("Unknown currency: {}", other))),
        }
    }
}

/// Track published to the community feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedTrack {
    pub id: Uuid,
    pub track_id: Uuid,
    pub owner: String,
    pub title: String,
    pub style: String,
    pub filename: String,
    /// IPFS gateway URL when the audio was pinned
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub plays: u64,
    pub shared_at: DateTime<Utc>,
}

/// Fixed-price marketplace offer for a shared track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub track_id: Uuid,
    pub seller: String,
    pub title: String,
    pub style: String,
    pub filename: String,
    pub price: f64,
    pub currency: Currency,
    #[serde(default)]
    pub sold: bool,
    #[serde(default)]
    pub buyer: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sold_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn is_active(&self) -> bool {
        !self.sold
    }
}

/// Verified on-chain credit purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub tx_hash: String,
    pub address: String,
    pub credits: u64,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

/// Early-access whitelist registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhitelistEntry {
    pub address: String,
    #[serde(default)]
    pub email: Option<String>,
    pub added_at: DateTime<Utc>,
}
