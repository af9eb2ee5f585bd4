//! Chain JSON-RPC access: log queries, block metadata, and the
//! best-effort token snapshot read used for enrichment and
//! `requestSnapshot`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Failure talking to the chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// Network-level failure (timeout, refused, dropped socket).
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    #[error("rpc protocol error: {0}")]
    Protocol(String),
    /// The node's answer could not be decoded.
    #[error("rpc decode error: {0}")]
    Decode(String),
}

/// A raw EVM log as returned by `eth_getLogs` or a log subscription,
/// with hex fields already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract address (`0x…`).
    pub address: String,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed data (`0x…`).
    pub data: String,
    /// Block the log appeared in.
    pub block_number: u64,
    /// Source transaction hash.
    pub tx_hash: String,
    /// Position within the transaction receipt.
    pub log_index: u32,
    /// Set when the log was dropped by a reorg.
    pub removed: bool,
}

/// Current launchpad-side state of a token, read on demand.
///
/// Optional/best-effort everywhere it is used: trade enrichment and
/// room snapshot requests both degrade gracefully without it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// Token contract address.
    pub token: String,
    /// Current spot price (string-encoded fixed-point integer).
    pub price: String,
    /// Total token supply (string-encoded fixed-point integer).
    pub total_supply: String,
}

/// Read access to the chain, mockable for tests.
#[async_trait]
pub trait ChainRpc: Send + Sync + std::fmt::Debug {
    /// Returns the current head block number.
    async fn head_block(&self) -> Result<u64, RpcError>;

    /// Returns all logs emitted by `contract` in `[from, to]`.
    async fn logs(&self, contract: &str, from: u64, to: u64) -> Result<Vec<RawLog>, RpcError>;

    /// Returns the Unix timestamp of a block.
    async fn block_timestamp(&self, block: u64) -> Result<i64, RpcError>;

    /// Reads the current launchpad state of a token.
    async fn token_snapshot(&self, token: &str) -> Result<TokenSnapshot, RpcError>;
}

/// Function selector of the launchpad's `tokenState(address)` view.
const TOKEN_STATE_SELECTOR: &str = "0x2f8a7c3d";

/// JSON-RPC over HTTP implementation of [`ChainRpc`].
#[derive(Debug)]
pub struct HttpRpc {
    url: String,
    launchpad: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpc {
    /// Creates a client against `url`, reading token snapshots from the
    /// `launchpad` contract.
    #[must_use]
    pub fn new(url: String, launchpad: String) -> Self {
        Self {
            url,
            launchpad,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(err) = response.get("error") {
            return Err(RpcError::Protocol(err.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode("missing result field".to_string()))
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn head_block(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        hex_field_u64(&result)
    }

    async fn logs(&self, contract: &str, from: u64, to: u64) -> Result<Vec<RawLog>, RpcError> {
        let result = self
            .call(
                "eth_getLogs",
                json!([{
                    "fromBlock": format!("{from:#x}"),
                    "toBlock": format!("{to:#x}"),
                    "address": contract,
                }]),
            )
            .await?;
        let entries = result
            .as_array()
            .ok_or_else(|| RpcError::Decode("eth_getLogs: expected array".to_string()))?;
        entries.iter().map(log_from_json).collect()
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, RpcError> {
        let result = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("{block:#x}"), false]),
            )
            .await?;
        let ts = result
            .get("timestamp")
            .ok_or_else(|| RpcError::Decode("block without timestamp".to_string()))?;
        hex_field_u64(ts).map(|v| v as i64)
    }

    async fn token_snapshot(&self, token: &str) -> Result<TokenSnapshot, RpcError> {
        let data = format!(
            "{TOKEN_STATE_SELECTOR}{}",
            pad_address(token).ok_or_else(|| RpcError::Decode(format!("bad address: {token}")))?
        );
        let result = self
            .call(
                "eth_call",
                json!([{ "to": self.launchpad, "data": data }, "latest"]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_call: expected hex string".to_string()))?;

        let price = word_to_decimal(raw, 0)
            .ok_or_else(|| RpcError::Decode("tokenState: missing price word".to_string()))?;
        let total_supply = word_to_decimal(raw, 1)
            .ok_or_else(|| RpcError::Decode("tokenState: missing supply word".to_string()))?;
        Ok(TokenSnapshot {
            token: token.to_ascii_lowercase(),
            price,
            total_supply,
        })
    }
}

/// Parses a hex JSON field (`"0x1a"`) to `u64`.
fn hex_field_u64(value: &Value) -> Result<u64, RpcError> {
    let raw = value
        .as_str()
        .ok_or_else(|| RpcError::Decode("expected hex string".to_string()))?;
    parse_hex_u64(raw).ok_or_else(|| RpcError::Decode(format!("bad hex quantity: {raw}")))
}

/// Parses a hex-encoded quantity (with or without `0x`) to `u64`.
#[must_use]
pub fn parse_hex_u64(raw: &str) -> Option<u64> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(stripped, 16).ok()
}

/// Converts one `eth_getLogs` entry into a [`RawLog`].
///
/// # Errors
///
/// Returns [`RpcError::Decode`] when a required field is missing or
/// malformed.
pub fn log_from_json(entry: &Value) -> Result<RawLog, RpcError> {
    let field = |name: &str| -> Result<&str, RpcError> {
        entry
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Decode(format!("log missing field: {name}")))
    };
    let topics = entry
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Decode("log missing topics".to_string()))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    Ok(RawLog {
        address: field("address")?.to_ascii_lowercase(),
        topics,
        data: field("data")?.to_string(),
        block_number: parse_hex_u64(field("blockNumber")?)
            .ok_or_else(|| RpcError::Decode("bad blockNumber".to_string()))?,
        tx_hash: field("transactionHash")?.to_string(),
        log_index: parse_hex_u64(field("logIndex")?)
            .ok_or_else(|| RpcError::Decode("bad logIndex".to_string()))? as u32,
        removed: entry
            .get("removed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Left-pads an address to a 32-byte call argument (no `0x`).
fn pad_address(address: &str) -> Option<String> {
    let hex_part = address.strip_prefix("0x")?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{:0>64}", hex_part.to_ascii_lowercase()))
}

/// Extracts the `index`-th 32-byte word of ABI return data as a decimal
/// string. Values wider than 128 bits read as `None`.
#[must_use]
pub fn word_to_decimal(data: &str, index: usize) -> Option<String> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let word = stripped.get(index * 64..(index + 1) * 64)?;
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some("0".to_string());
    }
    if trimmed.len() > 32 {
        return None; // wider than u128
    }
    u128::from_str_radix(trimmed, 16)
        .ok()
        .map(|v| v.to_string())
}
