pub mod consensus;
pub mod execution;
pub mod receipts;
pub mod wasm;

use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::models::transactions::{ConsensusTxResult, EvmTxLocation, RawTransaction, ReceiptData};

/// Read access to the execution layer (JSON-RPC).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RawTransaction>>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>>;

    /// `eth_call` against `contract`, pinned to `block`.
    async fn call(&self, contract: Address, input: Bytes, block: u64) -> Result<Bytes>;

    /// Deployed bytecode; empty for externally owned accounts.
    async fn code(&self, address: Address) -> Result<Bytes>;

    async fn block_number(&self) -> Result<u64>;
}

/// Read access to the consensus layer: CometBFT RPC plus the SDK REST gateway.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Locates the consensus transaction that carried an execution-layer tx.
    async fn evm_tx_location(&self, hash: B256) -> Result<Option<EvmTxLocation>>;

    /// Raw transactions of a block, in block order.
    async fn block_txs(&self, height: u64) -> Result<Vec<Vec<u8>>>;

    /// Consensus result for an (uppercase hex) tx hash, with its messages.
    async fn tx_by_hash(&self, hash: &str) -> Result<Option<ConsensusTxResult>>;

    async fn module_params(&self, module: &str) -> Result<Value>;
}

/// Read access to wasm contract state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WasmQueryClient: Send + Sync {
    /// Code id of the contract, `0` if nothing is instantiated at `contract`.
    async fn contract_code_id(&self, contract: &str) -> Result<u64>;

    /// Raw JSON reply of a smart query, optionally pinned to a height.
    async fn smart_contract_state(&self, contract: &str, query: &Value, height: Option<u64>) -> Result<Vec<u8>>;
}

/// Sends a GET and decodes the JSON body. Non-success statuses become errors
/// carrying the gateway's message, except 404 which yields `None`.
pub(crate) async fn send_json(request: RequestBuilder) -> Result<Option<Value>> {
    let response = request.send().await.context("request failed")?;
    let status = response.status();
    let body = response.text().await.context("failed to read response body")?;

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        return Err(anyhow!("{}: {}", status, message));
    }

    let value: Value = serde_json::from_str(&body).context("failed to decode response JSON")?;
    Ok(Some(value))
}

/// Unwraps a CometBFT JSON-RPC envelope.
pub(crate) fn jsonrpc_result(envelope: Value) -> Result<Value> {
    if let Some(error) = envelope.get("error") {
        let message = error
            .get("data")
            .and_then(Value::as_str)
            .or_else(|| error.get("message").and_then(Value::as_str))
            .unwrap_or("unknown error");
        return Err(anyhow!("RPC error: {}", message));
    }
    match envelope {
        Value::Object(mut fields) => fields.remove("result").ok_or_else(|| anyhow!("RPC response has no result")),
        _ => Err(anyhow!("RPC response is not an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jsonrpc_envelope_is_unwrapped() {
        let ok = json!({"jsonrpc": "2.0", "id": -1, "result": {"txs": []}});
        assert_eq!(jsonrpc_result(ok).unwrap(), json!({"txs": []}));

        let err = json!({"jsonrpc": "2.0", "id": -1, "error": {"code": -32603, "message": "Internal error", "data": "height 9 must be less than or equal to the current blockchain height 5"}});
        let message = jsonrpc_result(err).unwrap_err().to_string();
        assert!(message.contains("must be less than or equal"));
    }
}
