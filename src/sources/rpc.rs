//! On-chain reads over JSON-RPC
//!
//! Only the handful of view functions and events this engine needs are
//! encoded here, so calldata is built by hand: a 4-byte keccak selector
//! followed by 32-byte words. Return data and log data are decoded the same way.
//!
//! - `RpcVaultChain` - vault metadata, owner classification, pool accounting
//! - `RpcTwabRewards` - promotion events of the TWAB rewards contract

use super::{http_client, PromotionSource, VaultChain};
use crate::aggregation::amounts::Amount;
use crate::aggregation::promotions::{PromotionCreated, PromotionEnded, PromotionEvents};
use crate::aggregation::types::{DrawId, SafeOwnerInfo, VaultMetadata};
use crate::error::AggregationError;
use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    Transport(String),
    Node { code: i64, message: String },
    Decode(String),
    InvalidArgument(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Transport(e) => write!(f, "RPC transport error: {}", e),
            RpcError::Node { code, message } => write!(f, "RPC error {}: {}", code, message),
            RpcError::Decode(e) => write!(f, "ABI decode error: {}", e),
            RpcError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<RpcError> for AggregationError {
    fn from(err: RpcError) -> Self {
        AggregationError::Enrichment(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

/// One `eth_getLogs` entry; only the fields decoded here
#[derive(Debug, Clone, Deserialize)]
struct RpcLog {
    topics: Vec<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// First four bytes of `keccak256(signature)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI argument word
pub enum Arg<'a> {
    Address(&'a str),
    Uint(u64),
}

/// Selector plus static arguments, `0x`-prefixed
pub fn encode_call(signature: &str, args: &[Arg<'_>]) -> Result<String, RpcError> {
    let mut data = selector(signature).to_vec();
    for arg in args {
        let mut word = [0u8; WORD];
        match arg {
            Arg::Address(raw) => {
                let address = Address::from_str(raw)
                    .map_err(|e| RpcError::InvalidArgument(format!("{}: {}", raw, e)))?;
                word[12..].copy_from_slice(address.as_slice());
            }
            Arg::Uint(value) => word[24..].copy_from_slice(&value.to_be_bytes()),
        }
        data.extend_from_slice(&word);
    }
    Ok(format!("0x{}", hex::encode(data)))
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], RpcError> {
    data.get(offset..offset + WORD)
        .ok_or_else(|| RpcError::Decode(format!("short return data ({} bytes)", data.len())))
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize, RpcError> {
    let value = decode_uint_at(data, offset)?;
    if value > U256::from(u32::MAX) {
        return Err(RpcError::Decode(format!("offset out of range: {}", value)));
    }
    Ok(value.as_limbs()[0] as usize)
}

fn decode_uint_at(data: &[u8], offset: usize) -> Result<U256, RpcError> {
    let word = word_at(data, offset)?;
    U256::try_from_be_slice(word).ok_or_else(|| RpcError::Decode("uint overflow".to_string()))
}

fn decode_address_at(data: &[u8], offset: usize) -> Result<String, RpcError> {
    let word = word_at(data, offset)?;
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, RpcError> {
    decode_uint_at(data, 0)
}

pub fn decode_u64(data: &[u8]) -> Result<u64, RpcError> {
    let value = decode_uint(data)?;
    if value > U256::from(u64::MAX) {
        return Err(RpcError::Decode(format!("value does not fit u64: {}", value)));
    }
    Ok(value.as_limbs()[0])
}

pub fn decode_address(data: &[u8]) -> Result<String, RpcError> {
    decode_address_at(data, 0)
}

/// Dynamic `string`, with a `bytes32` fallback for legacy tokens
pub fn decode_string(data: &[u8]) -> Result<String, RpcError> {
    if data.len() == WORD {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        return Ok(String::from_utf8_lossy(&trimmed).into_owned());
    }
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start + len)
        .ok_or_else(|| RpcError::Decode("string runs past return data".to_string()))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

pub fn decode_address_array(data: &[u8]) -> Result<Vec<String>, RpcError> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    (0..len)
        .map(|i| decode_address_at(data, offset + WORD * (i + 1)))
        .collect()
}

fn parse_hex(raw: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(raw.trim_start_matches("0x")).map_err(|e| RpcError::Decode(e.to_string()))
}

/// Bare JSON-RPC client shared by the on-chain collaborators
struct JsonRpc {
    client: reqwest::Client,
    rpc_url: String,
}

impl JsonRpc {
    fn new(rpc_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(20)?,
            rpc_url: rpc_url.to_string(),
        })
    }

    async fn request_value(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!("HTTP {}", response.status())));
        }

        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("malformed response: {}", e)))?;

        if let Some(err) = decoded.error {
            return Err(RpcError::Node { code: err.code, message: err.message });
        }
        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }

    /// Methods whose result is a single hex blob
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<Vec<u8>, RpcError> {
        match self.request_value(method, params).await? {
            serde_json::Value::String(raw) => parse_hex(&raw),
            serde_json::Value::Null => Ok(Vec::new()),
            other => Err(RpcError::Decode(format!("expected hex result, got {}", other))),
        }
    }

    async fn call(&self, to: &str, signature: &str, args: &[Arg<'_>]) -> Result<Vec<u8>, RpcError> {
        let data = encode_call(signature, args)?;
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    async fn call_string(&self, to: &str, signature: &str) -> Result<String, RpcError> {
        decode_string(&self.call(to, signature, &[]).await?)
    }

    async fn call_address(&self, to: &str, signature: &str) -> Result<String, RpcError> {
        decode_address(&self.call(to, signature, &[]).await?)
    }

    async fn logs(&self, address: &str, from_block: u64, topic: &str) -> Result<Vec<RpcLog>, RpcError> {
        let filter = json!([{
            "address": address,
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": "latest",
            "topics": [topic],
        }]);
        let value = self.request_value("eth_getLogs", filter).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(format!("logs: {}", e)))
    }
}

pub struct RpcVaultChain {
    rpc: JsonRpc,
}

impl RpcVaultChain {
    pub fn new(rpc_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            rpc: JsonRpc::new(rpc_url)?,
        })
    }
}

#[async_trait]
impl VaultChain for RpcVaultChain {
    async fn vault_metadata(&self, vault: &str) -> Result<VaultMetadata, AggregationError> {
        let name = self.rpc.call_string(vault, "name()").await?;
        let symbol = self.rpc.call_string(vault, "symbol()").await?;
        let decimals = decode_u64(&self.rpc.call(vault, "decimals()", &[]).await?)?;
        let asset = self.rpc.call_address(vault, "asset()").await?;
        let owner = self.rpc.call_address(vault, "owner()").await?;
        let liquidation_pair = self.rpc.call_address(vault, "liquidationPair()").await?;
        let asset_symbol = self.rpc.call_string(&asset, "symbol()").await?;

        Ok(VaultMetadata {
            name,
            symbol,
            decimals: u8::try_from(decimals)
                .map_err(|_| AggregationError::Enrichment(format!("{}: decimals {}", vault, decimals)))?,
            asset,
            asset_symbol,
            owner,
            liquidation_pair,
        })
    }

    async fn owner_info(&self, owner: &str) -> Result<Option<SafeOwnerInfo>, AggregationError> {
        let code = self.rpc.request("eth_getCode", json!([owner, "latest"])).await?;
        if code.is_empty() {
            return Ok(None);
        }
        // Contract owners that do not answer the Safe interface are not multisigs
        let threshold = match self.rpc.call(owner, "getThreshold()", &[]).await {
            Ok(data) => decode_u64(&data)?,
            Err(RpcError::Node { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let owners = decode_address_array(&self.rpc.call(owner, "getOwners()", &[]).await?)?;
        Ok(Some(SafeOwnerInfo { threshold, owners }))
    }

    async fn last_awarded_draw_id(&self, prize_pool: &str) -> Result<DrawId, AggregationError> {
        let data = self
            .rpc
            .call(prize_pool, "getLastAwardedDrawId()", &[])
            .await
            .map_err(|e| AggregationError::SourceUnavailable(e.to_string()))?;
        decode_u64(&data).map_err(|e| AggregationError::SourceUnavailable(e.to_string()))
    }

    async fn contributed_between(
        &self,
        prize_pool: &str,
        vault: &str,
        start: DrawId,
        end: DrawId,
    ) -> Result<Amount, AggregationError> {
        let data = self
            .rpc
            .call(
                prize_pool,
                "getContributedBetween(address,uint24,uint24)",
                &[Arg::Address(vault), Arg::Uint(start), Arg::Uint(end)],
            )
            .await?;
        Ok(Amount(decode_uint(&data)?))
    }
}

const PROMOTION_CREATED: &str = "PromotionCreated(uint256,address,address,uint64,uint256,uint48,uint8)";
const PROMOTION_ENDED: &str = "PromotionEnded(uint256,address,uint256,uint8)";

/// `keccak256(signature)` as a `0x` topic
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

fn topic_at(log: &RpcLog, index: usize) -> Result<Vec<u8>, RpcError> {
    let raw = log
        .topics
        .get(index)
        .ok_or_else(|| RpcError::Decode(format!("log has no topic {}", index)))?;
    parse_hex(raw)
}

/// Indexed: promotionId, vault, token. Data: start, tokensPerEpoch, epochDuration, epochs
fn decode_promotion_created(log: &RpcLog) -> Result<PromotionCreated, RpcError> {
    let data = parse_hex(&log.data)?;
    Ok(PromotionCreated {
        promotion_id: decode_u64(&topic_at(log, 1)?)?,
        vault: decode_address(&topic_at(log, 2)?)?,
        token: decode_address(&topic_at(log, 3)?)?,
        start_timestamp: decode_u64(word_at(&data, 0)?)?,
        tokens_per_epoch: Amount(decode_uint_at(&data, WORD)?),
        epoch_duration: decode_u64(word_at(&data, 2 * WORD)?)?,
        initial_number_of_epochs: decode_u64(word_at(&data, 3 * WORD)?)?,
    })
}

/// Indexed: promotionId, recipient. Data: amount, epochNumber
fn decode_promotion_ended(log: &RpcLog) -> Result<PromotionEnded, RpcError> {
    let data = parse_hex(&log.data)?;
    Ok(PromotionEnded {
        promotion_id: decode_u64(&topic_at(log, 1)?)?,
        epoch_number: decode_u64(word_at(&data, WORD)?)?,
    })
}

/// Promotion events of one TWAB rewards contract
pub struct RpcTwabRewards {
    rpc: JsonRpc,
    contract: String,
    from_block: u64,
}

impl RpcTwabRewards {
    pub fn new(rpc_url: &str, contract: &str, from_block: u64) -> Result<Self, reqwest::Error> {
        Ok(Self {
            rpc: JsonRpc::new(rpc_url)?,
            contract: contract.to_lowercase(),
            from_block,
        })
    }
}

#[async_trait]
impl PromotionSource for RpcTwabRewards {
    async fn promotion_events(&self) -> Result<PromotionEvents, AggregationError> {
        let unavailable = |e: RpcError| AggregationError::SourceUnavailable(e.to_string());
        let created_logs = self
            .rpc
            .logs(&self.contract, self.from_block, &event_topic(PROMOTION_CREATED))
            .await
            .map_err(unavailable)?;
        let ended_logs = self
            .rpc
            .logs(&self.contract, self.from_block, &event_topic(PROMOTION_ENDED))
            .await
            .map_err(unavailable)?;

        let mut events = PromotionEvents::default();
        for entry in &created_logs {
            match decode_promotion_created(entry) {
                Ok(created) => events.created.push(created),
                Err(e) => log::warn!("⚠️  Skipping PromotionCreated log: {}", e),
            }
        }
        for entry in &ended_logs {
            match decode_promotion_ended(entry) {
                Ok(ended) => events.ended.push(ended),
                Err(e) => log::warn!("⚠️  Skipping PromotionEnded log: {}", e),
            }
        }
        Ok(events)
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, AggregationError> {
        let decimals = decode_u64(&self.rpc.call(token, "decimals()", &[]).await?)?;
        u8::try_from(decimals).map_err(|_| AggregationError::DataShape(format!("{}: decimals {}", token, decimals)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64) -> Vec<u8> {
        let mut w = vec![0u8; WORD];
        w[24..].copy_from_slice(&value.to_be_bytes());
        w
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("name()")), "06fdde03");
        assert_eq!(hex::encode(selector("decimals()")), "313ce567");
        assert_eq!(hex::encode(selector("symbol()")), "95d89b41");
    }

    #[test]
    fn test_encode_address_and_uint_args() {
        let data = encode_call(
            "getContributedBetween(address,uint24,uint24)",
            &[
                Arg::Address("0xe32e5e1c5f0c80bd26def2d0ea5008c107000d6a"),
                Arg::Uint(5),
                Arg::Uint(11),
            ],
        )
        .unwrap();
        // 0x + selector + 3 words
        assert_eq!(data.len(), 2 + 8 + 3 * 64);
        assert!(data.contains("000000000000000000000000e32e5e1c5f0c80bd26def2d0ea5008c107000d6a"));
        assert!(data.ends_with("000b"));
    }

    #[test]
    fn test_encode_rejects_bad_address() {
        assert!(encode_call("owner()", &[Arg::Address("0x12")]).is_err());
    }

    #[test]
    fn test_decode_dynamic_string() {
        let mut data = word(32);
        data.extend(word(5));
        let mut body = b"PRZUS".to_vec();
        body.resize(WORD, 0);
        data.extend(body);
        assert_eq!(decode_string(&data).unwrap(), "PRZUS");
    }

    #[test]
    fn test_decode_bytes32_string() {
        let mut data = b"MKR".to_vec();
        data.resize(WORD, 0);
        assert_eq!(decode_string(&data).unwrap(), "MKR");
    }

    #[test]
    fn test_decode_address_array() {
        let mut data = word(32);
        data.extend(word(2));
        let mut a = vec![0u8; 12];
        a.extend([0x11u8; 20]);
        let mut b = vec![0u8; 12];
        b.extend([0x22u8; 20]);
        data.extend(a);
        data.extend(b);

        let owners = decode_address_array(&data).unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0], format!("0x{}", "11".repeat(20)));
    }

    #[test]
    fn test_decode_short_data_is_error() {
        assert!(decode_uint(&[0u8; 4]).is_err());
        assert!(decode_address_array(&word(64)).is_err());
    }

    #[test]
    fn test_decode_u64_range() {
        assert_eq!(decode_u64(&word(18)).unwrap(), 18);
        assert!(decode_u64(&[0xffu8; WORD]).is_err());
    }

    fn topic(value: u64) -> String {
        format!("0x{}", hex::encode(word(value)))
    }

    fn address_topic(byte: u8) -> String {
        let mut w = vec![0u8; 12];
        w.extend([byte; 20]);
        format!("0x{}", hex::encode(w))
    }

    #[test]
    fn test_promotion_created_log() {
        let mut data = word(1_700_000_000);
        data.extend(word(5_000_000));
        data.extend(word(604_800));
        data.extend(word(12));
        let log = RpcLog {
            topics: vec![
                event_topic(PROMOTION_CREATED),
                topic(9),
                address_topic(0x11),
                address_topic(0x22),
            ],
            data: format!("0x{}", hex::encode(data)),
        };

        let created = decode_promotion_created(&log).unwrap();
        assert_eq!(created.promotion_id, 9);
        assert_eq!(created.vault, format!("0x{}", "11".repeat(20)));
        assert_eq!(created.token, format!("0x{}", "22".repeat(20)));
        assert_eq!(created.start_timestamp, 1_700_000_000);
        assert_eq!(created.tokens_per_epoch, Amount::from(5_000_000));
        assert_eq!(created.epoch_duration, 604_800);
        assert_eq!(created.initial_number_of_epochs, 12);
    }

    #[test]
    fn test_promotion_ended_log() {
        let mut data = word(123);
        data.extend(word(4));
        let log = RpcLog {
            topics: vec![event_topic(PROMOTION_ENDED), topic(9), address_topic(0x33)],
            data: format!("0x{}", hex::encode(data)),
        };
        let ended = decode_promotion_ended(&log).unwrap();
        assert_eq!(ended.promotion_id, 9);
        assert_eq!(ended.epoch_number, 4);

        let truncated = RpcLog {
            topics: vec![event_topic(PROMOTION_ENDED)],
            data: "0x".to_string(),
        };
        assert!(decode_promotion_ended(&truncated).is_err());
    }

    #[test]
    fn test_log_list_shape() {
        let value = serde_json::json!([
            { "address": "0xabc", "topics": ["0x01"], "data": "0x", "blockNumber": "0x10" }
        ]);
        let logs: Vec<RpcLog> = serde_json::from_value(value).unwrap();
        assert_eq!(logs[0].topics, vec!["0x01".to_string()]);
    }
}
