pub mod evm;
pub mod rpc;
pub mod transformations;
pub mod wasm;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::backend::evm::EvmBackend;
use crate::backend::rpc::{ConsensusClient, ExecutionClient, WasmQueryClient};
use crate::backend::wasm::messages::MessageRegistry;
use crate::backend::wasm::WasmBackend;
use crate::models::common::{ChainVariant, Extension, GenericResponse};
use crate::models::errors::{ApiError, ConfigError};
use crate::models::involvers::InvolverSet;
use crate::models::tokens::{Cw20Balances, Erc20Balances, TokenDescriptor};
use crate::models::transactions::TransactionView;

/// Chain-specific behaviour behind the explorer API. Interceptable calls answer
/// `Ok(None)` for inputs the backend does not handle; token calls for a foreign
/// contract family answer `Unimplemented`.
#[async_trait]
pub trait ExtensionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Textual address family used for output.
    fn chain_variant(&self) -> ChainVariant {
        ChainVariant::Cosmos
    }

    async fn transaction_by_hash(&self, _hash: &str) -> Result<Option<TransactionView>, ApiError> {
        Ok(None)
    }

    async fn transaction_involvers(&self, _hash: &str) -> Result<Option<InvolverSet>, ApiError> {
        Ok(None)
    }

    /// Fields appended to the account view, e.g. contract metadata.
    async fn account_info(&self, _address: &str) -> Result<Option<GenericResponse>, ApiError> {
        Ok(None)
    }

    async fn module_params(&self, _module: &str) -> Result<Option<Value>, ApiError> {
        Ok(None)
    }

    async fn denoms(&self) -> Result<Option<BTreeMap<String, String>>, ApiError> {
        Ok(None)
    }

    async fn erc20_contract_info(&self, _contract: &str) -> Result<TokenDescriptor, ApiError> {
        Err(ApiError::unimplemented(format!("ERC-20 is not supported by the {} extension", self.name())))
    }

    async fn erc20_balance(&self, _account: &str, _contracts: &[String]) -> Result<Erc20Balances, ApiError> {
        Err(ApiError::unimplemented(format!("ERC-20 is not supported by the {} extension", self.name())))
    }

    async fn cw20_contract_info(&self, _contract: &str) -> Result<TokenDescriptor, ApiError> {
        Err(ApiError::unimplemented(format!("CW-20 is not supported by the {} extension", self.name())))
    }

    async fn cw20_balance(&self, _account: &str, _contracts: &[String]) -> Result<Cw20Balances, ApiError> {
        Err(ApiError::unimplemented(format!("CW-20 is not supported by the {} extension", self.name())))
    }
}

/// Serves nothing beyond the base explorer API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl ExtensionBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "none"
    }
}

/// Upstream connections available to the backends.
#[derive(Clone)]
pub struct UpstreamClients {
    pub execution: Option<Arc<dyn ExecutionClient>>,
    pub consensus: Arc<dyn ConsensusClient>,
    pub wasm: Arc<dyn WasmQueryClient>,
}

/// Builds the backend for the configured extension. `Auto` asks the node which
/// modules it runs: `evm` first, then `wasm`, else no extension.
pub async fn select_backend(
    extension: Extension,
    clients: UpstreamClients,
    bech32_prefix: &str,
    balance_concurrency: usize,
) -> Result<Arc<dyn ExtensionBackend>, ConfigError> {
    let extension = match extension {
        Extension::Auto => detect_extension(&clients).await,
        other => other,
    };

    let invalid_prefix = |e: ApiError| ConfigError::InvalidPrefix {
        prefix: bech32_prefix.to_string(),
        reason: e.message().to_string(),
    };

    let backend: Arc<dyn ExtensionBackend> = match extension {
        Extension::Evm => {
            let execution = clients.execution.ok_or_else(|| ConfigError::MissingField {
                extension: "evm".to_string(),
                field: "execution_rpc_url".to_string(),
            })?;
            Arc::new(
                EvmBackend::new(execution, clients.consensus, bech32_prefix, balance_concurrency)
                    .map_err(invalid_prefix)?,
            )
        }
        Extension::Wasm => Arc::new(
            WasmBackend::new(
                clients.consensus,
                clients.wasm,
                Arc::new(MessageRegistry::new()),
                bech32_prefix,
                balance_concurrency,
            )
            .map_err(invalid_prefix)?,
        ),
        Extension::None | Extension::Auto => Arc::new(NoopBackend),
    };

    info!("Extension backend: {}", backend.name());
    Ok(backend)
}

async fn detect_extension(clients: &UpstreamClients) -> Extension {
    if clients.execution.is_some() && clients.consensus.module_params("evm").await.is_ok() {
        return Extension::Evm;
    }
    if clients.consensus.module_params("wasm").await.is_ok() {
        return Extension::Wasm;
    }
    info!("Node runs neither the evm nor the wasm module");
    Extension::None
}
