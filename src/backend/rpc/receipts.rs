use alloy_consensus::Eip658Value;
use alloy_network::AnyTransactionReceipt;
use anyhow::{Context, Result};

use crate::models::transactions::ReceiptData;

pub trait ReceiptParser {
    fn parse_receipt(self) -> Result<ReceiptData>;
}

impl ReceiptParser for AnyTransactionReceipt {
    fn parse_receipt(self) -> Result<ReceiptData> {
        // Echoed back to the caller as-is
        let body = serde_json::to_value(&self).context("failed to encode receipt")?;

        // Access the inner ReceiptWithBloom through the AnyReceiptEnvelope
        let receipt_with_bloom = &self.inner.inner.inner;

        let status = match receipt_with_bloom.receipt.status {
            Eip658Value::Eip658(success) => Some(success),
            Eip658Value::PostState(_) => None,
        };

        let logs = receipt_with_bloom
            .receipt
            .logs
            .iter()
            .map(|log| log.inner.clone())
            .collect();

        Ok(ReceiptData {
            status,
            from: self.inner.from,
            to: self.inner.to,
            contract_address: self.inner.contract_address,
            logs,
            body,
        })
    }
}
