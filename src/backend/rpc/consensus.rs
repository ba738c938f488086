use alloy_primitives::{hex, B256};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::backend::rpc::{jsonrpc_result, send_json, ConsensusClient};
use crate::metrics::Metrics;
use crate::models::messages::CosmosMessage;
use crate::models::transactions::{ConsensusEvent, ConsensusTxResult, EvmTxLocation};
use crate::utils::instrument::instrumented;
use crate::utils::{deserialize_u64, upper_hex};

pub const EVM_TX_EVENT: &str = "ethereum_tx";
pub const EVM_TX_HASH_ATTRIBUTE: &str = "ethereumTxHash";

/// Hash under which the node indexes a raw block transaction.
pub fn consensus_tx_hash(raw_tx: &[u8]) -> String {
    upper_hex(&Sha256::digest(raw_tx))
}

/// Base URL without a trailing slash, validated up front.
pub(crate) fn base_url(raw: &str, what: &str) -> Result<String> {
    let url: Url = raw.parse().with_context(|| format!("invalid {what} URL"))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Looks an attribute up by key. Older CometBFT releases base64 encode both key
/// and value, so a second pass decodes them.
fn attribute_value(event: &ConsensusEvent, key: &str) -> Option<String> {
    if let Some(value) = event.attribute(key) {
        return Some(value.to_string());
    }
    event.attributes.iter().find_map(|attr| {
        let decoded_key = STANDARD.decode(attr.key.as_bytes()).ok()?;
        if decoded_key != key.as_bytes() {
            return None;
        }
        let decoded_value = STANDARD.decode(attr.value.as_bytes()).ok()?;
        String::from_utf8(decoded_value).ok()
    })
}

#[derive(Debug, Deserialize)]
struct TxSearchResult {
    #[serde(default)]
    txs: Vec<IndexedTx>,
}

#[derive(Debug, Deserialize)]
struct IndexedTx {
    #[serde(deserialize_with = "deserialize_u64")]
    height: u64,
    #[serde(default)]
    index: usize,
    tx_result: IndexedTxResult,
}

#[derive(Debug, Deserialize)]
struct IndexedTxResult {
    #[serde(default)]
    events: Vec<ConsensusEvent>,
}

impl IndexedTx {
    /// Position of `hash` among the distinct EVM messages of this tx. The ante
    /// handler and the message handler may both emit an event per message, so
    /// repeated hashes are skipped.
    fn location_of(&self, hash: &str) -> Option<EvmTxLocation> {
        let mut seen: Vec<String> = Vec::new();
        for event in self.tx_result.events.iter().filter(|e| e.kind == EVM_TX_EVENT) {
            let Some(event_hash) = attribute_value(event, EVM_TX_HASH_ATTRIBUTE) else {
                continue;
            };
            let event_hash = event_hash.to_ascii_lowercase();
            if event_hash == hash {
                let msg_index = seen.iter().position(|h| *h == event_hash).unwrap_or(seen.len());
                return Some(EvmTxLocation {
                    height: self.height,
                    tx_index: self.index,
                    msg_index,
                });
            }
            if !seen.contains(&event_hash) {
                seen.push(event_hash);
            }
        }
        None
    }
}

/// Consensus client over the CometBFT RPC (`/tx_search`, `/block`) and the
/// SDK REST gateway (`/cosmos/tx/v1beta1/txs`, module params).
pub struct CometConsensusClient {
    http: reqwest::Client,
    rpc_url: String,
    rest_url: String,
    metrics: Option<Arc<Metrics>>,
}

impl CometConsensusClient {
    pub fn new(rpc_url: &str, rest_url: &str, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let rpc_url = base_url(rpc_url, "consensus RPC")?;
        let rest_url = base_url(rest_url, "REST API")?;
        info!("Consensus RPC URL: {}, REST API URL: {}", rpc_url, rest_url);

        Ok(Self {
            http: reqwest::Client::new(),
            rpc_url,
            rest_url,
            metrics,
        })
    }
}

#[async_trait]
impl ConsensusClient for CometConsensusClient {
    async fn evm_tx_location(&self, hash: B256) -> Result<Option<EvmTxLocation>> {
        instrumented(self.metrics.as_deref(), "tx_search", async {
            let hash = hex::encode_prefixed(hash);
            let query = format!("\"{EVM_TX_EVENT}.{EVM_TX_HASH_ATTRIBUTE}='{hash}'\"");
            let request = self.http.get(format!("{}/tx_search", self.rpc_url)).query(&[
                ("query", query.as_str()),
                ("prove", "false"),
                ("page", "1"),
                ("per_page", "10"),
            ]);

            let envelope = send_json(request)
                .await
                .context("tx_search")?
                .ok_or_else(|| anyhow!("tx_search is not served by the consensus RPC"))?;
            let search: TxSearchResult =
                serde_json::from_value(jsonrpc_result(envelope)?).context("failed to decode tx_search result")?;

            Ok(search.txs.iter().find_map(|tx| tx.location_of(&hash)))
        })
        .await
    }

    async fn block_txs(&self, height: u64) -> Result<Vec<Vec<u8>>> {
        instrumented(self.metrics.as_deref(), "block", async {
            let request = self
                .http
                .get(format!("{}/block", self.rpc_url))
                .query(&[("height", height.to_string())]);

            let envelope = send_json(request)
                .await
                .with_context(|| format!("failed to get block {height}"))?
                .ok_or_else(|| anyhow!("block is not served by the consensus RPC"))?;
            let result = jsonrpc_result(envelope)?;

            let txs = result
                .pointer("/block/data/txs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            txs.iter()
                .map(|tx| {
                    let encoded = tx.as_str().ok_or_else(|| anyhow!("block tx is not a string"))?;
                    STANDARD.decode(encoded).context("block tx is not base64")
                })
                .collect()
        })
        .await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<ConsensusTxResult>> {
        instrumented(self.metrics.as_deref(), "cosmos_tx", async {
            let request = self.http.get(format!("{}/cosmos/tx/v1beta1/txs/{}", self.rest_url, hash));

            let Some(body) = send_json(request)
                .await
                .with_context(|| format!("failed to get cosmos tx {hash}"))?
            else {
                return Ok(None);
            };

            let response = body
                .get("tx_response")
                .cloned()
                .ok_or_else(|| anyhow!("cosmos tx {hash} has no tx_response"))?;
            let mut result: ConsensusTxResult =
                serde_json::from_value(response).context("failed to decode tx_response")?;

            let messages = body
                .pointer("/tx/body/messages")
                .cloned()
                .unwrap_or(Value::Array(vec![]));
            result.messages =
                serde_json::from_value::<Vec<CosmosMessage>>(messages).context("failed to decode tx messages")?;

            Ok(Some(result))
        })
        .await
    }

    async fn module_params(&self, module: &str) -> Result<Value> {
        let path = match module {
            "evm" => "/evmos/evm/v1/params",
            "wasm" | "cosmwasm" => "/cosmwasm/wasm/v1/codes/params",
            other => bail!("no params endpoint known for module {other}"),
        };

        instrumented(self.metrics.as_deref(), "module_params", async {
            let request = self.http.get(format!("{}{}", self.rest_url, path));
            let body = send_json(request)
                .await
                .with_context(|| format!("failed to get {module} params"))?
                .ok_or_else(|| anyhow!("module {module} is not served by this node"))?;

            body.get("params")
                .cloned()
                .ok_or_else(|| anyhow!("{module} params response has no params"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH: &str = "0x6f1c1d8e5bcc4e3a1a7a9c4d2cd8f3c7b1e1f0a2b3c4d5e6f708192a3b4c5d6e";
    const OTHER: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn consensus_hash_is_uppercase_sha256() {
        assert_eq!(
            consensus_tx_hash(b""),
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        );
    }

    #[test]
    fn message_index_counts_distinct_evm_messages() {
        let indexed: IndexedTx = serde_json::from_value(json!({
            "height": "120",
            "index": 3,
            "tx_result": {"events": [
                {"type": "ethereum_tx", "attributes": [{"key": "ethereumTxHash", "value": OTHER}]},
                {"type": "ethereum_tx", "attributes": [{"key": "ethereumTxHash", "value": HASH}]},
                {"type": "message", "attributes": [{"key": "sender", "value": "evmos1xyz"}]},
                {"type": "ethereum_tx", "attributes": [{"key": "ethereumTxHash", "value": OTHER}]},
                {"type": "ethereum_tx", "attributes": [{"key": "ethereumTxHash", "value": HASH}]}
            ]}
        }))
        .unwrap();

        let location = indexed.location_of(HASH).unwrap();
        assert_eq!(location, EvmTxLocation { height: 120, tx_index: 3, msg_index: 1 });
        assert!(indexed.location_of("0xdead").is_none());
    }

    #[test]
    fn base64_attributes_are_understood() {
        let event = ConsensusEvent {
            kind: EVM_TX_EVENT.to_string(),
            attributes: vec![crate::models::transactions::EventAttribute {
                key: STANDARD.encode(EVM_TX_HASH_ATTRIBUTE),
                value: STANDARD.encode(HASH),
            }],
        };
        assert_eq!(attribute_value(&event, EVM_TX_HASH_ATTRIBUTE).as_deref(), Some(HASH));
    }
}
