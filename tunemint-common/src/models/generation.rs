//! Music generation jobs and the tracks they produce

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credits::LedgerKind;

/// Who pays for a generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Payer {
    /// Free credit from an off-chain ledger
    Offchain { kind: LedgerKind, id: String },
    /// On-chain credit consumed by a wallet transaction
    Onchain { address: String, tx_hash: String },
}

impl Payer {
    /// Identifier used for rate limiting
    pub fn rate_limit_key(&self) -> String {
        match self {
            Payer::Offchain { kind, id } => format!("{}:{}", kind, id),
            Payer::Onchain { address, .. } => format!("wallet:{}", address),
        }
    }

    /// Wallet that will own the resulting tracks, if known from the payer
    pub fn wallet(&self) -> Option<&str> {
        match self {
            Payer::Offchain { .. } => None,
            Payer::Onchain { address, .. } => Some(address),
        }
    }
}

/// Lifecycle of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, provider has not reported progress yet
    Pending,
    /// Provider reported partial progress
    Running,
    Completed,
    /// Provider reported a terminal failure
    Failed,
    /// Polling gave up
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut)
    }
}

/// Result of the compensating refund after a failed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundOutcome {
    pub refunded: bool,
    /// Transaction hash for on-chain refunds
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Failure reason when `refunded` is false
    #[serde(default)]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// One generation request and its monitoring state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: Uuid,
    pub task_id: String,
    pub payer: Payer,
    /// Wallet that owns the produced tracks
    #[serde(default)]
    pub owner: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
    pub status: JobStatus,
    /// Last raw status string reported by the provider
    #[serde(default)]
    pub provider_status: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub track_ids: Vec<Uuid>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub refund: Option<RefundOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audio produced by a completed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedTrack {
    pub id: Uuid,
    pub job_id: Uuid,
    #[serde(default)]
    pub owner: Option<String>,
    pub title: String,
    pub style: String,
    pub prompt: String,
    /// File name under the audio directory
    pub filename: String,
    /// Provider URL the audio was downloaded from
    pub source_url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub ipfs_cid: Option<String>,
    /// Metadata URI once minted
    #[serde(default)]
    pub token_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payer_wire_format() {
        let json = r#"{"offchain":{"kind":"fingerprint","id":"abc"}}"#;
        let payer: Payer = serde_json::from_str(json).unwrap();
        assert_eq!(
            payer,
            Payer::Offchain {
                kind: LedgerKind::Fingerprint,
                id: "abc".to_string()
            }
        );
        assert_eq!(payer.rate_limit_key(), "fingerprint:abc");
        assert!(payer.wallet().is_none());
    }

    #[test]
    fn test_onchain_payer_owns_tracks() {
        let payer = Payer::Onchain {
            address: "0xabc".to_string(),
            tx_hash: "0x01".to_string(),
        };
        assert_eq!(payer.wallet(), Some("0xabc"));
        assert_eq!(payer.rate_limit_key(), "wallet:0xabc");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
        assert_eq!(serde_json::to_string(&JobStatus::TimedOut).unwrap(), "\"timed_out\"");
    }
}
