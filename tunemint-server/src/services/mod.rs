//! Business services and external integrations

pub mod chain;
pub mod credits;
pub mod generation;
pub mod ipfs_client;
pub mod price_oracle;
pub mod rate_limit;
pub mod suno_client;

pub use chain::{ChainError, ChainGateway, JsonRpcChain, TxReceipt};
pub use credits::CreditService;
pub use generation::{MonitorError, StartGeneration};
pub use ipfs_client::{IpfsClient, IpfsError};
pub use price_oracle::{OracleError, PriceOracle};
pub use rate_limit::{FixedWindowLimiter, RateDecision};
pub use suno_client::{GenerateRequest, SunoClient, SunoError, TaskStatus};

use crate::error::ApiError;

impl From<SunoError> for ApiError {
    fn from(err: SunoError) -> Self {
        ApiError::Upstream(format!("Suno: {}", err))
    }
}

impl From<IpfsError> for ApiError {
    fn from(err: IpfsError) -> Self {
        match err {
            IpfsError::Io(..) => ApiError::Internal(err.to_string()),
            other => ApiError::Upstream(format!("IPFS: {}", other)),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        ApiError::Upstream(format!("Price oracle: {}", err))
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Config(msg) => ApiError::Unavailable(msg),
            other => ApiError::Upstream(format!("Chain: {}", other)),
        }
    }
}
