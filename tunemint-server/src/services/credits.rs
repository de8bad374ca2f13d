//! Off-chain credit ledgers backed by the JSON store

use chrono::{Duration, Utc};
use tracing::info;
use tunemint_common::config::CreditsConfig;
use tunemint_common::models::{CreditAccount, CreditLedger, LedgerKind};
use tunemint_common::{Document, Error, JsonStore, Result};

const MAX_ID_LEN: usize = 256;

/// Balance operations over the `ip`, `fingerprint` and `google` ledgers
#[derive(Clone)]
pub struct CreditService {
    ip: Document<CreditLedger>,
    fingerprint: Document<CreditLedger>,
    google: Document<CreditLedger>,
    policy: CreditsConfig,
}

impl CreditService {
    pub fn new(store: &JsonStore, policy: CreditsConfig) -> Self {
        Self {
            ip: store.document(&LedgerKind::Ip.document_name()),
            fingerprint: store.document(&LedgerKind::Fingerprint.document_name()),
            google: store.document(&LedgerKind::Google.document_name()),
            policy,
        }
    }

    pub fn policy(&self) -> &CreditsConfig {
        &self.policy
    }

    fn ledger(&self, kind: LedgerKind) -> &Document<CreditLedger> {
        match kind {
            LedgerKind::Ip => &self.ip,
            LedgerKind::Fingerprint => &self.fingerprint,
            LedgerKind::Google => &self.google,
        }
    }

    /// Current account, created with the initial grant on first sight
    pub async fn balance(&self, kind: LedgerKind, id: &str) -> Result<CreditAccount> {
        validate_id(id)?;
        let initial = self.policy.initial_credits;
        self.ledger(kind)
            .update(|ledger| Ok(ledger.account_mut(id, initial, Utc::now()).clone()))
            .await
    }

    /// Spend `amount` credits; fails without side effects when short
    pub async fn deduct(&self, kind: LedgerKind, id: &str, amount: u64) -> Result<u64> {
        validate_id(id)?;
        let initial = self.policy.initial_credits;
        let remaining = self
            .ledger(kind)
            .update(|ledger| ledger.deduct(id, amount, initial, Utc::now()))
            .await?;
        info!(ledger = %kind, amount, remaining, "Credits deducted");
        Ok(remaining)
    }

    /// Give `amount` credits back
    pub async fn refund(&self, kind: LedgerKind, id: &str, amount: u64) -> Result<u64> {
        validate_id(id)?;
        let initial = self.policy.initial_credits;
        let balance = self
            .ledger(kind)
            .update(|ledger| Ok(ledger.refund(id, amount, initial, Utc::now())))
            .await?;
        info!(ledger = %kind, amount, balance, "Credits refunded");
        Ok(balance)
    }

    /// Periodic free-credit claim
    pub async fn claim(&self, kind: LedgerKind, id: &str) -> Result<u64> {
        validate_id(id)?;
        let initial = self.policy.initial_credits;
        let amount = self.policy.daily_claim_amount;
        let cooldown = Duration::hours(self.policy.claim_cooldown_hours);
        self.ledger(kind)
            .update(|ledger| ledger.claim(id, amount, cooldown, initial, Utc::now()))
            .await
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("Credit identifier is required".to_string()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "Credit identifier longer than {} characters",
            MAX_ID_LEN
        )));
    }
    Ok(())
}
