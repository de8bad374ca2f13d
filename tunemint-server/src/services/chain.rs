//! Credit contract access over Ethereum JSON-RPC
//!
//! Reads go through `eth_call`; refunds and withdrawals are sent with
//! `eth_sendTransaction` from the operator account, which the node holds
//! unlocked. Calldata is a 4-byte Keccak-256 selector followed by 32-byte
//! ABI words.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use tunemint_common::config::ChainConfig;
use tunemint_common::wallet::normalize_address;
use tunemint_common::Document;

use crate::error::ApiError;

/// Paid purchase of credits; the argument is the credit count
pub const PURCHASE_CREDITS: &str = "purchaseCredits(uint256)";
/// Spend of on-chain credits; the argument is the credit count
pub const USE_CREDITS: &str = "useCredits(uint256)";

const CREDITS_OF: &str = "getCredits(address)";
const REFUND_CREDITS: &str = "refundCredits(address,uint256)";
const WITHDRAW: &str = "withdraw()";

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid chain configuration: {0}")]
    Config(String),
}

/// Mined transaction summary
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub tx_hash: String,
    /// Lowercase sender address
    pub from: String,
    /// Lowercase recipient; `None` for contract creation
    pub to: Option<String>,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Verified contract call with its first ABI argument
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub receipt: TxReceipt,
    pub argument: u64,
}

/// Operations the server needs from the credit contract
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// On-chain credit counter for `address`
    async fn credit_balance(&self, address: &str) -> Result<u64, ChainError>;

    /// Receipt of a mined transaction, `None` while pending or unknown
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError>;

    /// Calldata of a transaction, `None` if the node does not know it
    async fn transaction_input(&self, tx_hash: &str) -> Result<Option<String>, ChainError>;

    /// Give credits back to `address`; returns the transaction hash
    async fn refund_credits(&self, address: &str, amount: u64) -> Result<String, ChainError>;

    /// Move the contract balance to the owner; returns the transaction hash
    async fn withdraw(&self) -> Result<String, ChainError>;

    /// Address of the credit contract, lowercase
    fn contract_address(&self) -> &str;
}

/// 4-byte function selector
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Left-pad a 20-byte address into an ABI word
pub fn encode_address(address: &str) -> Result<[u8; 32], ChainError> {
    let normalized = normalize_address(address).map_err(|e| ChainError::Parse(e.to_string()))?;
    let bytes = hex::decode(&normalized[2..]).map_err(|e| ChainError::Parse(e.to_string()))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

pub fn encode_uint(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `0x`-prefixed calldata for `signature` with pre-encoded words
pub fn encode_call(signature: &str, words: &[[u8; 32]]) -> String {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

/// Decode the first returned word as an unsigned integer that fits in u64
pub fn decode_uint(result: &str) -> Result<u64, ChainError> {
    let digits = result.trim_start_matches("0x");
    if digits.is_empty() {
        return Err(ChainError::Parse("Empty call result".to_string()));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::Parse(format!("Not hex data: {}", result)));
    }
    let word = &digits[..digits.len().min(64)];
    let significant = word.trim_start_matches('0');
    if significant.len() > 16 {
        return Err(ChainError::Parse(format!("Value does not fit in u64: 0x{}", word)));
    }
    if significant.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(significant, 16).map_err(|e| ChainError::Parse(e.to_string()))
}

/// Fetch a receipt and check it is a successful `signature` call from `from`
/// to the contract
///
/// `tx_hash` and `from` must already be normalized.
pub async fn verify_transaction(
    chain: &dyn ChainGateway,
    tx_hash: &str,
    from: &str,
    signature: &str,
) -> Result<ContractCall, ApiError> {
    let receipt = chain
        .transaction_receipt(tx_hash)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("Transaction {} not found or not mined", tx_hash)))?;

    if !receipt.success {
        return Err(ApiError::BadRequest(format!("Transaction {} reverted", tx_hash)));
    }
    if receipt.from != from {
        return Err(ApiError::Forbidden(format!(
            "Transaction {} was not sent by {}",
            tx_hash, from
        )));
    }
    if receipt.to.as_deref() != Some(chain.contract_address()) {
        return Err(ApiError::BadRequest(format!(
            "Transaction {} is not a credit contract call",
            tx_hash
        )));
    }

    let input = chain.transaction_input(tx_hash).await?.unwrap_or_default();
    let argument = call_argument(&input, signature).ok_or_else(|| {
        ApiError::BadRequest(format!("Transaction {} is not a {} call", tx_hash, signature))
    })?;

    Ok(ContractCall { receipt, argument })
}

/// Record `tx_hash` as spent; a hash counts once across purchases and
/// generations
pub async fn redeem_transaction(
    redeemed: &Document<BTreeSet<String>>,
    tx_hash: &str,
) -> Result<(), ApiError> {
    redeemed
        .update(|set| {
            if set.insert(tx_hash.to_string()) {
                Ok(())
            } else {
                Err(tunemint_common::Error::Conflict(format!(
                    "Transaction {} already used",
                    tx_hash
                )))
            }
        })
        .await?;
    Ok(())
}

/// First argument of `input` if it is calldata for `signature`
fn call_argument(input: &str, signature: &str) -> Option<u64> {
    let digits = input.trim_start_matches("0x").to_ascii_lowercase();
    let args = digits.strip_prefix(&hex::encode(selector(signature)))?;
    if args.len() < 64 || !args.is_ascii() {
        return None;
    }
    decode_uint(&args[..64]).ok()
}

fn parse_quantity(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(default)]
    input: Option<String>,
}

/// [`ChainGateway`] over a plain JSON-RPC endpoint
pub struct JsonRpcChain {
    http_client: reqwest::Client,
    rpc_url: String,
    contract: String,
    operator: String,
    next_id: AtomicU64,
}

impl JsonRpcChain {
    pub fn new(rpc_url: &str, contract: &str, operator: &str) -> Result<Self, ChainError> {
        let contract = normalize_address(contract).map_err(|e| ChainError::Config(e.to_string()))?;
        let operator = normalize_address(operator).map_err(|e| ChainError::Config(e.to_string()))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
            contract,
            operator,
            next_id: AtomicU64::new(1),
        })
    }

    /// `None` unless RPC URL, contract and operator are all configured
    pub fn from_config(config: &ChainConfig) -> Result<Option<Self>, ChainError> {
        match (&config.rpc_url, &config.contract_address, &config.operator_address) {
            (Some(url), Some(contract), Some(operator)) => {
                Self::new(url, contract, operator).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id});
        debug!(method, id, "JSON-RPC request");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChainError::Network(format!("HTTP {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Parse(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn send_transaction(&self, data: String) -> Result<String, ChainError> {
        let tx = json!({"from": self.operator, "to": self.contract, "data": data});
        let result = self.rpc("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Parse("eth_sendTransaction returned no hash".to_string()))
    }
}

#[async_trait]
impl ChainGateway for JsonRpcChain {
    async fn credit_balance(&self, address: &str) -> Result<u64, ChainError> {
        let data = encode_call(CREDITS_OF, &[encode_address(address)?]);
        let call = json!({"to": self.contract, "data": data});
        let result = self.rpc("eth_call", json!([call, "latest"])).await?;
        let hex_result = result
            .as_str()
            .ok_or_else(|| ChainError::Parse("eth_call returned no data".to_string()))?;
        decode_uint(hex_result)
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let result = self.rpc("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt =
            serde_json::from_value(result).map_err(|e| ChainError::Parse(e.to_string()))?;

        Ok(Some(TxReceipt {
            tx_hash: raw.transaction_hash.to_ascii_lowercase(),
            from: raw.from.to_ascii_lowercase(),
            to: raw.to.map(|t| t.to_ascii_lowercase()),
            success: raw.status.as_deref().and_then(parse_quantity) == Some(1),
            block_number: raw.block_number.as_deref().and_then(parse_quantity),
        }))
    }

    async fn transaction_input(&self, tx_hash: &str) -> Result<Option<String>, ChainError> {
        let result = self.rpc("eth_getTransactionByHash", json!([tx_hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawTransaction =
            serde_json::from_value(result).map_err(|e| ChainError::Parse(e.to_string()))?;
        Ok(raw.input)
    }

    async fn refund_credits(&self, address: &str, amount: u64) -> Result<String, ChainError> {
        let data = encode_call(REFUND_CREDITS, &[encode_address(address)?, encode_uint(amount)]);
        let tx_hash = self.send_transaction(data).await?;
        info!(address, amount, tx_hash = %tx_hash, "On-chain refund sent");
        Ok(tx_hash)
    }

    async fn withdraw(&self) -> Result<String, ChainError> {
        let tx_hash = self.send_transaction(encode_call(WITHDRAW, &[])).await?;
        info!(tx_hash = %tx_hash, "Contract withdrawal sent");
        Ok(tx_hash)
    }

    fn contract_address(&self) -> &str {
        &self.contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    const ALICE: &str = "0x00000000000000000000000000000000000000aa";
    const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
    const OPERATOR: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(hex::encode(selector("withdraw()")), "3ccfd60b");
    }

    #[test]
    fn test_encode_call_layout() {
        let data = encode_call(REFUND_CREDITS, &[encode_address(ALICE).unwrap(), encode_uint(3)]);
        assert_eq!(data.len(), 2 + 8 + 64 * 2);
        assert!(data.ends_with(&format!("{}3", "0".repeat(63))));
        assert!(data.contains(&format!("{}aa", "0".repeat(62))));
    }

    #[test]
    fn test_decode_uint() {
        assert_eq!(decode_uint(&format!("0x{}2a", "0".repeat(62))).unwrap(), 42);
        assert_eq!(decode_uint(&format!("0x{}", "0".repeat(64))).unwrap(), 0);
        assert!(decode_uint("0x").is_err());
        assert!(decode_uint(&format!("0x1{}", "0".repeat(63))).is_err());
    }

    #[test]
    fn test_decode_uint_rejects_non_hex() {
        assert!(decode_uint(&format!("0x{}é", "0".repeat(63))).is_err());
        assert!(decode_uint("0xzz").is_err());
    }

    #[test]
    fn test_call_argument_matches_selector() {
        let purchase = encode_call(PURCHASE_CREDITS, &[encode_uint(5)]);
        assert_eq!(call_argument(&purchase, PURCHASE_CREDITS), Some(5));
        assert_eq!(call_argument(&purchase, USE_CREDITS), None);
        assert_eq!(call_argument(&purchase[..20], PURCHASE_CREDITS), None);
        assert_eq!(call_argument("", USE_CREDITS), None);
    }

    #[test]
    fn test_from_config_needs_all_settings() {
        let mut config = ChainConfig {
            rpc_url: Some("http://localhost:8545".to_string()),
            contract_address: Some(CONTRACT.to_string()),
            operator_address: None,
        };
        assert!(JsonRpcChain::from_config(&config).unwrap().is_none());

        config.operator_address = Some("not-an-address".to_string());
        assert!(matches!(JsonRpcChain::from_config(&config), Err(ChainError::Config(_))));
    }

    async fn fake_node() -> String {
        async fn handle(Json(req): Json<Value>) -> Json<Value> {
            let id = req["id"].clone();
            let result = match req["method"].as_str() {
                Some("eth_call") => json!(format!("0x{}07", "0".repeat(62))),
                Some("eth_getTransactionReceipt") if req["params"][0] == "0xmissing" => Value::Null,
                Some("eth_getTransactionReceipt") => json!({
                    "transactionHash": req["params"][0],
                    "from": "0x00000000000000000000000000000000000000AA",
                    "to": CONTRACT,
                    "status": "0x1",
                    "blockNumber": "0x10"
                }),
                Some("eth_getTransactionByHash") if req["params"][0] == "0xmissing" => Value::Null,
                Some("eth_getTransactionByHash") => json!({
                    "hash": req["params"][0],
                    "input": encode_call(USE_CREDITS, &[encode_uint(1)])
                }),
                Some("eth_sendTransaction") => json!("0xfeed"),
                _ => {
                    return Json(json!({"jsonrpc": "2.0", "id": id,
                        "error": {"code": -32601, "message": "method not found"}}))
                }
            };
            Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(handle)))
                .await
                .unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_json_rpc_round_trips() {
        let url = fake_node().await;
        let chain = JsonRpcChain::new(&url, CONTRACT, OPERATOR).unwrap();

        assert_eq!(chain.credit_balance(ALICE).await.unwrap(), 7);

        let receipt = chain.transaction_receipt("0xabc").await.unwrap().unwrap();
        assert_eq!(receipt.from, ALICE);
        assert!(receipt.success);
        assert_eq!(receipt.block_number, Some(16));

        assert!(chain.transaction_receipt("0xmissing").await.unwrap().is_none());
        assert!(chain.transaction_input("0xmissing").await.unwrap().is_none());
        assert_eq!(chain.refund_credits(ALICE, 1).await.unwrap(), "0xfeed");
    }

    #[tokio::test]
    async fn test_verify_transaction_checks_sender() {
        let url = fake_node().await;
        let chain = JsonRpcChain::new(&url, CONTRACT, OPERATOR).unwrap();

        let call = verify_transaction(&chain, "0xabc", ALICE, USE_CREDITS).await.unwrap();
        assert_eq!(call.argument, 1);
        assert!(matches!(
            verify_transaction(&chain, "0xabc", OPERATOR, USE_CREDITS).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            verify_transaction(&chain, "0xmissing", ALICE, USE_CREDITS).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_transaction_redeems_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = tunemint_common::JsonStore::open(dir.path()).await.unwrap();
        let redeemed = store.document::<BTreeSet<String>>("redeemed_txs");

        redeem_transaction(&redeemed, "0xabc").await.unwrap();
        assert!(matches!(
            redeem_transaction(&redeemed, "0xabc").await,
            Err(ApiError::Conflict(_))
        ));
        redeem_transaction(&redeemed, "0xdef").await.unwrap();
        assert_eq!(redeemed.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_verify_transaction_checks_called_function() {
        let url = fake_node().await;
        let chain = JsonRpcChain::new(&url, CONTRACT, OPERATOR).unwrap();

        assert!(matches!(
            verify_transaction(&chain, "0xabc", ALICE, PURCHASE_CREDITS).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
