use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Log;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::messages::CosmosMessage;
use crate::utils::deserialize_u64;

////////////////////////////////////// Upstream Data //////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// A module-emitted consensus event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl ConsensusEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Returns the requested attributes when the event has the given type and
    /// carries every one of the keys.
    pub fn attributes_if_all(&self, kind: &str, keys: &[&str]) -> Option<HashMap<String, String>> {
        if self.kind != kind {
            return None;
        }
        keys.iter()
            .map(|key| self.attribute(key).map(|value| (key.to_string(), value.to_string())))
            .collect()
    }
}

/// Consensus-level record of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsensusTxResult {
    #[serde(rename = "txhash", default)]
    pub hash: String,
    #[serde(deserialize_with = "deserialize_u64", default)]
    pub height: u64,
    #[serde(default)]
    pub code: u32,
    #[serde(deserialize_with = "deserialize_u64", default)]
    pub gas_wanted: u64,
    #[serde(deserialize_with = "deserialize_u64", default)]
    pub gas_used: u64,
    #[serde(default)]
    pub events: Vec<ConsensusEvent>,
    #[serde(default)]
    pub raw_log: String,
    #[serde(skip)]
    pub messages: Vec<CosmosMessage>,
}

/// Where an execution-layer transaction sits on the consensus side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmTxLocation {
    pub height: u64,
    /// Position of the enclosing consensus tx within its block.
    pub tx_index: usize,
    /// Position of the EVM message within the consensus tx.
    pub msg_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptData {
    /// `None` for pre-Byzantium style receipts carrying a state root instead.
    pub status: Option<bool>,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub logs: Vec<alloy_primitives::Log>,
    pub body: serde_json::Value,
}

/////////////////////////////////////// Response Data ///////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GasInfo {
    pub limit: u64,
    pub used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionResult {
    pub code: u32,
    pub success: bool,
    pub events: Vec<ConsensusEvent>,
    pub gas: GasInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Merged view of an execution-layer transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub height: u64,
    pub evm_tx: serde_json::Value,
    pub evm_receipt: Option<serde_json::Value>,
    pub result: TransactionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<Log>>,
}

/// Either view, serialized without a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransactionView {
    Evm(Box<TransactionRecord>),
    Wasm(WasmTransactionRecord),
}

/// View of a wasm-chain transaction with its messages parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WasmTransactionRecord {
    pub hash: String,
    pub height: u64,
    pub result: TransactionResult,
    pub messages: Vec<serde_json::Value>,
}
