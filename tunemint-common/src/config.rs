//! Bootstrap configuration
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the server binary)
//! 2. Environment variables ([`TomlConfig::apply_env`])
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! A missing config file is not an error: the service starts on defaults
//! and logs a warning. Integrations whose credentials are absent (Suno,
//! Pinata, JSON-RPC) are disabled rather than failing start-up.

use crate::wallet::normalize_address;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// Root of the JSON store and the audio directory
    pub data_dir: Option<PathBuf>,
    /// Shared secret for signed admin requests; 0 disables checking
    pub admin_secret: i64,
    pub logging: LoggingConfig,
    pub credits: CreditsConfig,
    pub rate_limit: RateLimitConfig,
    pub suno: SunoConfig,
    pub ipfs: IpfsConfig,
    pub oracle: OracleConfig,
    pub chain: ChainConfig,
    pub payment: PaymentConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5780".to_string(),
            data_dir: None,
            admin_secret: 0,
            logging: LoggingConfig::default(),
            credits: CreditsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            suno: SunoConfig::default(),
            ipfs: IpfsConfig::default(),
            oracle: OracleConfig::default(),
            chain: ChainConfig::default(),
            payment: PaymentConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Off-chain free credit policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Credits granted the first time an identifier is seen
    pub initial_credits: u64,
    /// Credits added by one claim
    pub daily_claim_amount: u64,
    /// Minimum time between two claims
    pub claim_cooldown_hours: i64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            initial_credits: 3,
            daily_claim_amount: 1,
            claim_cooldown_hours: 24,
        }
    }
}

/// Fixed-window limits for generation and chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 5,
        }
    }
}

/// Suno music generation API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunoConfig {
    pub base_url: String,
    /// Bearer key; generation is unavailable without it
    pub api_key: Option<String>,
    pub model: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Outbound request throttle
    pub requests_per_second: u32,
    /// Completion webhook passed to the provider; polling runs either way
    pub callback_url: Option<String>,
}

impl Default for SunoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sunoapi.org".to_string(),
            api_key: None,
            model: "V4_5".to_string(),
            poll_interval_ms: 10_000,
            max_poll_attempts: 60,
            requests_per_second: 2,
            callback_url: None,
        }
    }
}

/// Pinata IPFS pinning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    pub api_url: String,
    /// Pinata JWT; pinning is disabled without it
    pub jwt: Option<String>,
    pub gateway_url: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.pinata.cloud".to_string(),
            jwt: None,
            gateway_url: "https://gateway.pinata.cloud/ipfs".to_string(),
        }
    }
}

/// ETH/USD price oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub url: String,
    pub cache_ttl_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd"
                .to_string(),
            cache_ttl_secs: 60,
        }
    }
}

/// JSON-RPC endpoint and credit contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    /// Node-managed account that sends refund and withdrawal transactions
    pub operator_address: Option<String>,
}

impl ChainConfig {
    /// Chain features need all three settings
    pub fn is_enabled(&self) -> bool {
        self.rpc_url.is_some() && self.contract_address.is_some() && self.operator_address.is_some()
    }
}

/// Credit pricing for on-chain purchases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub usd_per_credit: f64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self { usd_per_credit: 0.5 }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from `path`, or from the platform default location
    ///
    /// An explicitly given path must exist. The default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", p.display())));
                }
                p.to_path_buf()
            }
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    warn!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Overlay process environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup (testable form of `apply_env`)
    pub fn apply_env_from<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TUNEMINT_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("TUNEMINT_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TUNEMINT_ADMIN_SECRET") {
            self.admin_secret = v
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("TUNEMINT_ADMIN_SECRET is not an i64: {}", e)))?;
        }
        if let Some(v) = get("SUNO_API_BASE_URL") {
            self.suno.base_url = v;
        }
        if let Some(v) = get("SUNO_API_KEY") {
            self.suno.api_key = Some(v);
        }
        if let Some(v) = get("SUNO_CALLBACK_URL") {
            self.suno.callback_url = Some(v);
        }
        if let Some(v) = get("PINATA_API_URL") {
            self.ipfs.api_url = v;
        }
        if let Some(v) = get("PINATA_JWT") {
            self.ipfs.jwt = Some(v);
        }
        if let Some(v) = get("IPFS_GATEWAY_URL") {
            self.ipfs.gateway_url = v;
        }
        if let Some(v) = get("PRICE_ORACLE_URL") {
            self.oracle.url = v;
        }
        if let Some(v) = get("CHAIN_RPC_URL") {
            self.chain.rpc_url = Some(v);
        }
        if let Some(v) = get("CREDIT_CONTRACT_ADDRESS") {
            self.chain.contract_address = Some(v);
        }
        if let Some(v) = get("OPERATOR_ADDRESS") {
            self.chain.operator_address = Some(v);
        }

        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.suno.poll_interval_ms == 0 {
            return Err(Error::Config("suno.poll_interval_ms must be positive".to_string()));
        }
        if self.suno.max_poll_attempts == 0 {
            return Err(Error::Config("suno.max_poll_attempts must be positive".to_string()));
        }
        if self.suno.requests_per_second == 0 {
            return Err(Error::Config("suno.requests_per_second must be positive".to_string()));
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.max_requests == 0 {
            return Err(Error::Config(
                "rate_limit.window_secs and rate_limit.max_requests must be positive".to_string(),
            ));
        }
        if self.credits.claim_cooldown_hours < 0 {
            return Err(Error::Config("credits.claim_cooldown_hours must not be negative".to_string()));
        }
        if !(self.payment.usd_per_credit > 0.0) {
            return Err(Error::Config("payment.usd_per_credit must be positive".to_string()));
        }
        for (name, value) in [
            ("chain.contract_address", &self.chain.contract_address),
            ("chain.operator_address", &self.chain.operator_address),
        ] {
            if let Some(addr) = value {
                normalize_address(addr)
                    .map_err(|e| Error::Config(format!("{}: {}", name, e)))?;
            }
        }
        Ok(())
    }

    /// Data directory, falling back to the OS-dependent default
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// `<config dir>/tunemint/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunemint").join("config.toml"))
}

/// `<local data dir>/tunemint`, or `./tunemint_data` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tunemint"))
        .unwrap_or_else(|| PathBuf::from("./tunemint_data"))
}
