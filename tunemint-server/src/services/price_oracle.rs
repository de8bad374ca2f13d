//! ETH/USD price lookup with a short-lived cache

use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use tunemint_common::config::OracleConfig;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Price API error {0}")]
    Api(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Implausible price: {0}")]
    InvalidPrice(f64),
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    ethereum: UsdQuote,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: f64,
}

pub struct PriceOracle {
    http_client: reqwest::Client,
    url: String,
    ttl: Duration,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl PriceOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            url: config.url.clone(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cached: Mutex::new(None),
        })
    }

    /// Current ETH price in USD
    pub async fn eth_usd(&self) -> Result<f64, OracleError> {
        // Held across the fetch so concurrent quotes share one request
        let mut cached = self.cached.lock().await;
        if let Some((price, fetched_at)) = *cached {
            if fetched_at.elapsed() < self.ttl {
                return Ok(price);
            }
        }

        let price = self.fetch().await?;
        *cached = Some((price, Instant::now()));
        Ok(price)
    }

    async fn fetch(&self) -> Result<f64, OracleError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Api(response.status().as_u16()));
        }

        let body: SimplePrice = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        let price = body.ethereum.usd;
        if !price.is_finite() || price <= 0.0 {
            return Err(OracleError::InvalidPrice(price));
        }
        debug!(price, "Fetched ETH/USD price");
        Ok(price)
    }
}
