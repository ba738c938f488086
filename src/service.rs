use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::ExtensionBackend;
use crate::models::common::GenericResponse;
use crate::models::errors::ApiError;
use crate::models::involvers::InvolverSet;
use crate::models::tokens::{Cw20Balances, Erc20Balances, TokenDescriptor};
use crate::models::transactions::TransactionView;
use crate::utils::address::AddressNormalizer;

/// The explorer API over whichever extension backend the node supports.
pub struct ExplorerService {
    backend: Arc<dyn ExtensionBackend>,
    normalizer: AddressNormalizer,
}

impl ExplorerService {
    /// Addresses are rendered in the family the backend works in.
    pub fn new(backend: Arc<dyn ExtensionBackend>, bech32_prefix: &str) -> Result<Self, ApiError> {
        let normalizer = AddressNormalizer::new(backend.chain_variant(), bech32_prefix)?;
        Ok(Self { backend, normalizer })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn unhandled(&self, what: &str) -> ApiError {
        ApiError::unimplemented(format!("{what} is not supported by the {} extension", self.backend.name()))
    }

    pub async fn transaction_by_hash(&self, hash: &str) -> Result<TransactionView, ApiError> {
        debug!("transaction_by_hash {}", hash);
        self.backend
            .transaction_by_hash(hash)
            .await?
            .ok_or_else(|| self.unhandled("transaction lookup"))
    }

    pub async fn transaction_involvers(&self, hash: &str) -> Result<InvolverSet, ApiError> {
        debug!("transaction_involvers {}", hash);
        self.backend
            .transaction_involvers(hash)
            .await?
            .ok_or_else(|| self.unhandled("involver lookup"))
    }

    /// Canonical address plus whatever the backend knows about it.
    pub async fn account(&self, address: &str) -> Result<GenericResponse, ApiError> {
        debug!("account {}", address);
        let canonical = self.normalizer.normalize(address)?;

        let mut response = GenericResponse::new();
        response.insert("address".to_string(), json!(canonical));
        if let Some(extra) = self.backend.account_info(canonical.as_str()).await? {
            response.extend(extra);
        }
        Ok(response)
    }

    pub async fn module_params(&self, module: &str) -> Result<Value, ApiError> {
        debug!("module_params {}", module);
        self.backend
            .module_params(module)
            .await?
            .ok_or_else(|| self.unhandled(&format!("module {module}")))
    }

    pub async fn denoms(&self) -> Result<BTreeMap<String, String>, ApiError> {
        debug!("denoms");
        self.backend.denoms().await?.ok_or_else(|| self.unhandled("denom lookup"))
    }

    pub async fn erc20_contract_info(&self, contract: &str) -> Result<TokenDescriptor, ApiError> {
        debug!("erc20_contract_info {}", contract);
        self.backend.erc20_contract_info(contract).await
    }

    pub async fn erc20_balance(&self, account: &str, contracts: &[String]) -> Result<Erc20Balances, ApiError> {
        debug!("erc20_balance {} ({} contracts)", account, contracts.len());
        self.backend.erc20_balance(account, contracts).await
    }

    pub async fn cw20_contract_info(&self, contract: &str) -> Result<TokenDescriptor, ApiError> {
        debug!("cw20_contract_info {}", contract);
        self.backend.cw20_contract_info(contract).await
    }

    pub async fn cw20_balance(&self, account: &str, contracts: &[String]) -> Result<Cw20Balances, ApiError> {
        debug!("cw20_balance {} ({} contracts)", account, contracts.len());
        self.backend.cw20_balance(account, contracts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopBackend;

    const HEX: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

    #[tokio::test]
    async fn account_view_is_canonical() {
        let service = ExplorerService::new(Arc::new(NoopBackend), "evmos").unwrap();
        let account = service.account(HEX).await.unwrap();

        let bech = account["address"].as_str().unwrap().to_string();
        assert!(bech.starts_with("evmos1"));
        assert_eq!(service.account(&bech).await.unwrap(), account);
    }

    #[tokio::test]
    async fn unhandled_lookups_are_unimplemented() {
        let service = ExplorerService::new(Arc::new(NoopBackend), "evmos").unwrap();
        assert!(matches!(
            service.transaction_by_hash("0xabc").await,
            Err(ApiError::Unimplemented(_))
        ));
        assert!(matches!(service.denoms().await, Err(ApiError::Unimplemented(_))));
        assert!(matches!(
            service.account("not-an-address").await,
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
