//! Admin request authentication via timestamp and hash
//!
//! Admin requests carry a millisecond `timestamp` and a SHA-256 `hash`
//! computed over the canonical JSON body (with `hash` replaced by 64 zeros)
//! followed by the shared secret as a decimal string. A secret of `0`
//! disables checking.
//!
//! Pure functions only; the axum middleware lives in the server crate.

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Placeholder written into the `hash` field before hashing
pub const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Oldest acceptable timestamp, relative to now
pub const MAX_PAST_MS: i64 = 30_000;

/// Largest clock skew tolerated for timestamps from the future
pub const MAX_FUTURE_MS: i64 = 1_000;

/// Authentication error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    /// Failed to parse request body
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Validate a request timestamp against the current time
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    validate_timestamp_at(timestamp, crate::time::now_millis())
}

/// Validate a request timestamp against an explicit `now`
pub fn validate_timestamp_at(timestamp: i64, now: i64) -> Result<(), ApiAuthError> {
    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

/// Calculate the request hash for `json_value` under `shared_secret`
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's Display is compact and escapes strings correctly
        other => other.to_string(),
    }
}

/// Validate hash matches calculated value
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

/// Produce a signed copy of `body` (adds `timestamp` and `hash`)
///
/// Used by operator tooling and tests to build admin requests.
pub fn sign_request(body: &Value, shared_secret: i64, timestamp: i64) -> Value {
    let mut signed = body.clone();
    if let Some(obj) = signed.as_object_mut() {
        obj.insert("timestamp".to_string(), Value::from(timestamp));
    }
    let hash = calculate_hash(&signed, shared_secret);
    if let Some(obj) = signed.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(hash));
    }
    signed
}
