use alloy_eips::BlockId;
use alloy_network::{AnyNetwork, TransactionResponse};
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_serde::WithOtherFields;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::backend::rpc::receipts::ReceiptParser;
use crate::backend::rpc::ExecutionClient;
use crate::metrics::Metrics;
use crate::models::transactions::{RawTransaction, ReceiptData};
use crate::utils::instrument::instrumented;

/// Gas granted to read-only contract calls.
pub const CALL_GAS_LIMIT: u64 = 300_000;

/// Execution-layer client backed by an alloy HTTP provider.
pub struct AlloyExecutionClient {
    provider: DynProvider<AnyNetwork>,
    metrics: Option<Arc<Metrics>>,
}

impl AlloyExecutionClient {
    pub fn connect(rpc_url: &str, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let url: Url = rpc_url.parse().context("invalid execution RPC URL")?;
        info!("Execution RPC URL: {}", url);

        let provider = ProviderBuilder::new()
            .network::<AnyNetwork>()
            .connect_http(url)
            .erased();

        Ok(Self { provider, metrics })
    }
}

#[async_trait]
impl ExecutionClient for AlloyExecutionClient {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RawTransaction>> {
        instrumented(self.metrics.as_deref(), "eth_getTransactionByHash", async {
            let tx = self
                .provider
                .get_transaction_by_hash(hash)
                .await
                .context("eth_getTransactionByHash")?;

            let Some(tx) = tx else {
                return Ok(None);
            };

            Ok(Some(RawTransaction {
                hash,
                block_number: tx.block_number(),
                body: serde_json::to_value(&tx).context("failed to encode transaction")?,
            }))
        })
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>> {
        instrumented(self.metrics.as_deref(), "eth_getTransactionReceipt", async {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .context("eth_getTransactionReceipt")?;

            receipt.map(ReceiptParser::parse_receipt).transpose()
        })
        .await
    }

    async fn call(&self, contract: Address, input: Bytes, block: u64) -> Result<Bytes> {
        instrumented(self.metrics.as_deref(), "eth_call", async {
            let request = TransactionRequest::default()
                .to(contract)
                .input(TransactionInput::new(input))
                .gas_limit(CALL_GAS_LIMIT);

            self.provider
                .call(WithOtherFields::new(request))
                .block(BlockId::number(block))
                .await
                .with_context(|| format!("eth_call to {contract} at block {block}"))
        })
        .await
    }

    async fn code(&self, address: Address) -> Result<Bytes> {
        instrumented(self.metrics.as_deref(), "eth_getCode", async {
            self.provider
                .get_code_at(address)
                .await
                .with_context(|| format!("eth_getCode for {address}"))
        })
        .await
    }

    async fn block_number(&self) -> Result<u64> {
        instrumented(self.metrics.as_deref(), "eth_blockNumber", async {
            self.provider.get_block_number().await.context("eth_blockNumber")
        })
        .await
    }
}
