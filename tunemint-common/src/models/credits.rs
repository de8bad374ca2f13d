//! Off-chain credit ledgers
//!
//! Free credits are tracked per identifier in one of three ledgers,
//! depending on how the visitor was identified. Each ledger is a single
//! JSON document, so every balance change is one locked read-modify-write.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Which identifier a ledger is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Client IP address
    Ip,
    /// Browser fingerprint
    Fingerprint,
    /// Google account UID
    Google,
}

impl LedgerKind {
    pub const ALL: [LedgerKind; 3] = [LedgerKind::Ip, LedgerKind::Fingerprint, LedgerKind::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Ip => "ip",
            LedgerKind::Fingerprint => "fingerprint",
            LedgerKind::Google => "google",
        }
    }

    /// Name of the store document holding this ledger
    pub fn document_name(&self) -> String {
        format!("credits_{}", self.as_str())
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ip" => Ok(LedgerKind::Ip),
            "fingerprint" => Ok(LedgerKind::Fingerprint),
            "google" => Ok(LedgerKind::Google),
            other => Err(Error::InvalidInput(format!("Unknown credit ledger: {}", other))),
        }
    }
}

/// Balance and history counters for one identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditAccount {
    pub credits: u64,
    #[serde(default)]
    pub total_used: u64,
    #[serde(default)]
    pub total_claimed: u64,
    #[serde(default)]
    pub total_refunded: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_claim_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    pub fn new(initial_credits: u64, now: DateTime<Utc>) -> Self {
        Self {
            credits: initial_credits,
            total_used: 0,
            total_claimed: 0,
            total_refunded: 0,
            created_at: now,
            last_claim_at: None,
            updated_at: now,
        }
    }

    /// When the next claim becomes possible, `None` if it already is
    pub fn next_claim_at(&self, cooldown: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.last_claim_at
            .map(|last| last + cooldown)
            .filter(|next| *next > now)
    }
}

/// One ledger: identifier → account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditLedger {
    #[serde(default)]
    pub accounts: BTreeMap<String, CreditAccount>,
}

impl CreditLedger {
    /// Account for `id`, created with `initial_credits` on first sight
    pub fn account_mut(&mut self, id: &str, initial_credits: u64, now: DateTime<Utc>) -> &mut CreditAccount {
        self.accounts
            .entry(id.to_string())
            .or_insert_with(|| CreditAccount::new(initial_credits, now))
    }

    /// Check-then-decrement; the balance is untouched on failure
    pub fn deduct(&mut self, id: &str, amount: u64, initial_credits: u64, now: DateTime<Utc>) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidInput("Amount must be positive".to_string()));
        }
        let account = self.account_mut(id, initial_credits, now);
        if account.credits < amount {
            return Err(Error::InsufficientCredits {
                available: account.credits,
                requested: amount,
            });
        }
        account.credits -= amount;
        account.total_used += amount;
        account.updated_at = now;
        Ok(account.credits)
    }

    /// Give credits back after a failed generation
    pub fn refund(&mut self, id: &str, amount: u64, initial_credits: u64, now: DateTime<Utc>) -> u64 {
        let account = self.account_mut(id, initial_credits, now);
        account.credits += amount;
        account.total_refunded += amount;
        account.updated_at = now;
        account.credits
    }

    /// Periodic free-credit claim
    pub fn claim(
        &mut self,
        id: &str,
        amount: u64,
        cooldown: Duration,
        initial_credits: u64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let account = self.account_mut(id, initial_credits, now);
        if let Some(next) = account.next_claim_at(cooldown, now) {
            return Err(Error::Conflict(format!(
                "Credits already claimed; next claim available at {}",
                next.to_rfc3339()
            )));
        }
        account.credits += amount;
        account.total_claimed += amount;
        account.last_claim_at = Some(now);
        account.updated_at = now;
        Ok(account.credits)
    }
}
