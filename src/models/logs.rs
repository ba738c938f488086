use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::models::involvers::InvolverRole;

/// What a pattern expects of the log's non-indexed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRequirement {
    /// Amount-style payloads must be present.
    NonEmpty,
    /// Everything is indexed; the payload must be empty.
    Empty,
}

/// A known event shape. Patterns are evaluated in catalog order and the first
/// match wins.
#[derive(Debug, Clone)]
pub struct EventPattern {
    pub name: &'static str,
    pub signature: B256,
    pub topic_count: usize,
    /// Topic indices that must hold a left-padded 20-byte address.
    pub address_topics: &'static [usize],
    pub data: DataRequirement,
    pub role: InvolverRole,
}

/// The pattern a log matched and the participant addresses taken from its
/// address-bearing topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogClassification {
    pub pattern: &'static str,
    pub role: InvolverRole,
    pub addresses: Vec<Address>,
}

/// Log entry as recorded by the EVM module in the consensus `tx_log` event.
/// `data` is base64, the rest mirrors the JSON-RPC log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusTxLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default, with = "base64_bytes")]
    pub data: Bytes,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default, rename = "transactionHash")]
    pub tx_hash: B256,
    #[serde(default, rename = "transactionIndex")]
    pub tx_index: u64,
    #[serde(default)]
    pub block_hash: B256,
    #[serde(default, rename = "logIndex")]
    pub index: u64,
    #[serde(default)]
    pub removed: bool,
}

mod base64_bytes {
    use alloy_primitives::Bytes;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
