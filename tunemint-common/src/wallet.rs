//! Wallet address helpers
//!
//! Every address that reaches a store goes through [`normalize_address`], so
//! lookups are case-insensitive regardless of the checksum casing the wallet
//! provider hands to the browser.

use crate::{Error, Result};

/// Normalize an EVM address to lowercase `0x` + 40 hex characters
pub fn normalize_address(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidInput(format!("Address must start with 0x: {}", trimmed)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "Address must be 40 hex characters: {}",
            trimmed
        )));
    }

    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// Check whether a string is a well-formed EVM address
pub fn is_valid_address(raw: &str) -> bool {
    normalize_address(raw).is_ok()
}

/// Normalize a transaction hash to lowercase `0x` + 64 hex characters
pub fn normalize_tx_hash(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidInput("Transaction hash must start with 0x".to_string()))?;

    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "Transaction hash must be 64 hex characters: {}",
            trimmed
        )));
    }

    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}
