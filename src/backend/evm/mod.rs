pub mod erc20;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::evm::erc20::Erc20Probe;
use crate::backend::rpc::consensus::consensus_tx_hash;
use crate::backend::rpc::{ConsensusClient, ExecutionClient};
use crate::backend::transformations::involvers::evm_involvers;
use crate::backend::transformations::transactions::merge_evm_transaction;
use crate::backend::ExtensionBackend;
use crate::models::common::{ChainVariant, GenericResponse};
use crate::models::errors::ApiError;
use crate::models::involvers::InvolverSet;
use crate::models::tokens::{Erc20Balances, TokenBalance, TokenDescriptor};
use crate::models::transactions::{TransactionRecord, TransactionView};
use crate::utils::address::{AddressBytes, AddressNormalizer};

/// Backend for chains running the EVM module.
pub struct EvmBackend {
    execution: Arc<dyn ExecutionClient>,
    consensus: Arc<dyn ConsensusClient>,
    normalizer: AddressNormalizer,
    balance_concurrency: usize,
}

/// Execution-layer hashes are `0x` prefixed; anything else belongs to another
/// backend.
fn parse_evm_hash(hash: &str) -> Option<Result<B256, ApiError>> {
    let lower = hash.trim().to_ascii_lowercase();
    if !lower.starts_with("0x") {
        return None;
    }
    Some(
        lower
            .parse::<B256>()
            .map_err(|e| ApiError::invalid_argument(format!("invalid transaction hash {hash}: {e}"))),
    )
}

impl EvmBackend {
    pub fn new(
        execution: Arc<dyn ExecutionClient>,
        consensus: Arc<dyn ConsensusClient>,
        bech32_prefix: &str,
        balance_concurrency: usize,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            execution,
            consensus,
            normalizer: AddressNormalizer::new(ChainVariant::Evm, bech32_prefix)?,
            balance_concurrency: balance_concurrency.max(1),
        })
    }

    async fn latest_block(&self) -> Result<u64, ApiError> {
        self.execution
            .block_number()
            .await
            .map_err(|e| ApiError::upstream("failed to get latest block number", e))
    }

    async fn contract_code_len(&self, address: Address) -> Result<usize, ApiError> {
        self.execution
            .code(address)
            .await
            .map(|code| code.len())
            .map_err(|e| ApiError::upstream("failed to get contract code", e))
    }

    pub async fn evm_transaction(&self, hash: B256) -> Result<TransactionRecord, ApiError> {
        let raw = self
            .execution
            .transaction_by_hash(hash)
            .await
            .map_err(|e| ApiError::upstream("failed to get transaction", e))?
            .ok_or_else(|| ApiError::not_found("transaction not found"))?;

        let location = self
            .consensus
            .evm_tx_location(hash)
            .await
            .map_err(|e| ApiError::upstream("failed to get transaction result", e))?
            .ok_or_else(|| ApiError::internal("failed to get transaction result: not indexed"))?;

        let block_txs = self
            .consensus
            .block_txs(location.height)
            .await
            .map_err(|e| ApiError::upstream("failed to get block", e))?;
        let cosmos_tx = block_txs.get(location.tx_index).ok_or_else(|| {
            ApiError::internal(format!(
                "failed to get block: tx index {} out of range at height {}",
                location.tx_index, location.height
            ))
        })?;

        let cosmos_hash = consensus_tx_hash(cosmos_tx);
        let result = self
            .consensus
            .tx_by_hash(&cosmos_hash)
            .await
            .map_err(|e| ApiError::upstream("failed to get cosmos tx result", e))?
            .ok_or_else(|| ApiError::internal(format!("failed to get cosmos tx result: {cosmos_hash} not found")))?;

        let receipt = self
            .execution
            .transaction_receipt(hash)
            .await
            .map_err(|e| ApiError::upstream("failed to get transaction receipt", e))?;

        merge_evm_transaction(raw, receipt, result, location)
    }

    /// One batch entry. Addresses without code get an empty record and no
    /// selector calls.
    async fn balance_entry(&self, account: Address, contract: Address, block: u64) -> Result<TokenBalance, ApiError> {
        let canonical = self.normalizer.from_evm(contract)?.to_string();
        if self.contract_code_len(contract).await? == 0 {
            return Ok(TokenBalance::empty(canonical));
        }

        let probe = Erc20Probe::new(self.execution.as_ref(), contract, block);
        let descriptor = probe.descriptor().await?;
        let balance = probe.balance_of(account).await?;

        Ok(TokenBalance {
            display: descriptor.display(&canonical),
            contract: canonical,
            decimals: descriptor.decimals,
            balance,
        })
    }

    /// Best-effort ERC-20 metadata for the account view.
    async fn contract_summary(&self, contract: Address) -> Result<GenericResponse, ApiError> {
        let block = self.latest_block().await?;
        let probe = Erc20Probe::new(self.execution.as_ref(), contract, block);

        let mut summary = GenericResponse::new();
        if let Some(symbol) = probe.symbol().await {
            summary.insert("symbol".to_string(), json!(symbol));
        }
        match probe.decimals().await {
            Ok(decimals) => {
                summary.insert("decimals".to_string(), json!(decimals));
            }
            Err(e) => debug!("No decimals for {}: {}", contract, e),
        }
        if let Some(name) = probe.name().await {
            summary.insert("name".to_string(), json!(name));
        }
        Ok(summary)
    }
}

#[async_trait]
impl ExtensionBackend for EvmBackend {
    fn name(&self) -> &'static str {
        "evm"
    }

    fn chain_variant(&self) -> ChainVariant {
        ChainVariant::Evm
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<TransactionView>, ApiError> {
        let Some(hash) = parse_evm_hash(hash) else {
            return Ok(None);
        };
        let record = self.evm_transaction(hash?).await?;
        Ok(Some(TransactionView::Evm(Box::new(record))))
    }

    async fn transaction_involvers(&self, hash: &str) -> Result<Option<InvolverSet>, ApiError> {
        let Some(hash) = parse_evm_hash(hash) else {
            return Ok(None);
        };
        let receipt = self
            .execution
            .transaction_receipt(hash?)
            .await
            .map_err(|e| ApiError::upstream("failed to get transaction receipt", e))?
            .ok_or_else(|| ApiError::not_found("transaction receipt not found"))?;

        evm_involvers(&self.normalizer, &receipt).map(Some)
    }

    async fn account_info(&self, address: &str) -> Result<Option<GenericResponse>, ApiError> {
        // Only 20-byte accounts can hold EVM code
        let Ok(AddressBytes::Evm(account)) = self.normalizer.decode(address) else {
            return Ok(None);
        };

        if self.contract_code_len(account).await? == 0 {
            return Ok(None);
        }

        let mut response = GenericResponse::new();
        response.insert("contract".to_string(), Value::Object(self.contract_summary(account).await?));
        Ok(Some(response))
    }

    async fn module_params(&self, module: &str) -> Result<Option<Value>, ApiError> {
        if module != "evm" {
            return Ok(None);
        }
        self.consensus
            .module_params(module)
            .await
            .map(Some)
            .map_err(|e| ApiError::upstream("failed to get evm params", e))
    }

    async fn denoms(&self) -> Result<Option<BTreeMap<String, String>>, ApiError> {
        let params = self
            .consensus
            .module_params("evm")
            .await
            .map_err(|e| ApiError::upstream("failed to get evm params", e))?;
        let evm_denom = params
            .get("evm_denom")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::internal("evm params have no evm_denom"))?;

        Ok(Some(BTreeMap::from([("evm".to_string(), evm_denom.to_string())])))
    }

    async fn erc20_contract_info(&self, contract: &str) -> Result<TokenDescriptor, ApiError> {
        let contract = self.normalizer.to_evm(contract)?;
        if self.contract_code_len(contract).await? == 0 {
            return Err(ApiError::not_found("not a contract"));
        }

        let block = self.latest_block().await?;
        Erc20Probe::new(self.execution.as_ref(), contract, block).descriptor().await
    }

    async fn erc20_balance(&self, account: &str, contracts: &[String]) -> Result<Erc20Balances, ApiError> {
        let account = self.normalizer.to_evm(account)?;
        let contracts = contracts
            .iter()
            .map(|contract| self.normalizer.to_evm(contract))
            .collect::<Result<Vec<_>, _>>()?;

        let block = self.latest_block().await?;

        // Order is preserved and the first failure drops the whole batch
        let erc20_balances = stream::iter(contracts)
            .map(|contract| self.balance_entry(account, contract, block))
            .buffered(self.balance_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(Erc20Balances {
            account: self.normalizer.from_evm(account)?.to_string(),
            erc20_balances,
        })
    }
}
