use alloy_primitives::LogData;
use alloy_rpc_types_eth::Log;

use crate::backend::rpc::consensus::EVM_TX_EVENT;
use crate::models::errors::ApiError;
use crate::models::logs::ConsensusTxLog;
use crate::models::transactions::{
    ConsensusEvent, ConsensusTxResult, EvmTxLocation, GasInfo, RawTransaction, ReceiptData,
    TransactionRecord, TransactionResult, WasmTransactionRecord,
};

pub const EVM_TX_FAILED_ATTRIBUTE: &str = "ethereumTxFailed";
pub const TX_LOG_EVENT: &str = "tx_log";
pub const TX_LOG_ATTRIBUTE: &str = "txLog";
/// Reported when a failed transaction left no reason behind.
pub const GENERIC_FAILURE: &str = "execution reverted";

/// A transaction succeeded only if consensus accepted it and the execution
/// receipt agrees. A missing receipt or status counts as failure.
pub fn derive_success(code: u32, receipt: Option<&ReceiptData>) -> bool {
    code == 0 && receipt.and_then(|r| r.status) == Some(true)
}

/// First failure reason recorded by the EVM module, or the generic one.
pub fn failure_reason(events: &[ConsensusEvent]) -> String {
    events
        .iter()
        .filter(|event| event.kind == EVM_TX_EVENT)
        .find_map(|event| event.attribute(EVM_TX_FAILED_ATTRIBUTE))
        .filter(|reason| !reason.is_empty())
        .unwrap_or(GENERIC_FAILURE)
        .to_string()
}

/// Execution logs of the `msg_index`-th EVM message of a consensus tx. The EVM
/// module emits one `tx_log` event per message, even when it has no logs.
pub fn logs_for_message(events: &[ConsensusEvent], msg_index: usize) -> Result<Vec<Log>, ApiError> {
    let event = events
        .iter()
        .filter(|event| event.kind == TX_LOG_EVENT)
        .nth(msg_index)
        .ok_or_else(|| ApiError::internal(format!("eth tx logs not found for message index {msg_index}")))?;

    event
        .attributes
        .iter()
        .filter(|attr| attr.key == TX_LOG_ATTRIBUTE)
        .map(|attr| {
            serde_json::from_str::<ConsensusTxLog>(&attr.value)
                .map(into_rpc_log)
                .map_err(|e| ApiError::internal(format!("failed to decode tx log: {e}")))
        })
        .collect()
}

fn into_rpc_log(log: ConsensusTxLog) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address: log.address,
            data: LogData::new_unchecked(log.topics, log.data),
        },
        block_hash: Some(log.block_hash),
        block_number: Some(log.block_number),
        block_timestamp: None,
        transaction_hash: Some(log.tx_hash),
        transaction_index: Some(log.tx_index),
        log_index: Some(log.index),
        removed: log.removed,
    }
}

/// Drops the raw log events; logs are returned decoded instead.
pub fn strip_log_events(events: Vec<ConsensusEvent>) -> Vec<ConsensusEvent> {
    events.into_iter().filter(|event| event.kind != TX_LOG_EVENT).collect()
}

fn transaction_result(result: &ConsensusTxResult, events: Vec<ConsensusEvent>, success: bool, error: Option<String>) -> TransactionResult {
    TransactionResult {
        code: result.code,
        success,
        events,
        gas: GasInfo {
            limit: result.gas_wanted,
            used: result.gas_used,
        },
        error,
    }
}

/// Combines the execution view of a transaction with the consensus result of
/// the transaction that carried it.
pub fn merge_evm_transaction(
    raw: RawTransaction,
    receipt: Option<ReceiptData>,
    result: ConsensusTxResult,
    location: EvmTxLocation,
) -> Result<TransactionRecord, ApiError> {
    let logs = logs_for_message(&result.events, location.msg_index)?;

    let success = derive_success(result.code, receipt.as_ref());
    let error = (!success).then(|| failure_reason(&result.events));
    let events = strip_log_events(result.events.clone());

    Ok(TransactionRecord {
        hash: raw.hash,
        height: raw.block_number.unwrap_or(location.height),
        evm_tx: raw.body,
        evm_receipt: receipt.map(|r| r.body),
        result: transaction_result(&result, events, success, error),
        logs: (!logs.is_empty()).then_some(logs),
    })
}

/// View of a wasm-chain transaction; consensus code alone decides success.
pub fn merge_wasm_transaction(result: ConsensusTxResult, messages: Vec<serde_json::Value>) -> WasmTransactionRecord {
    let success = result.code == 0;
    let error = (!success).then(|| {
        if result.raw_log.is_empty() {
            format!("failed with code {}", result.code)
        } else {
            result.raw_log.clone()
        }
    });

    WasmTransactionRecord {
        hash: result.hash.clone(),
        height: result.height,
        result: transaction_result(&result, result.events.clone(), success, error),
        messages,
    }
}
