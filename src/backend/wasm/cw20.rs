use async_trait::async_trait;
use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::rpc::WasmQueryClient;
use crate::backend::transformations::involvers::Cw20Verifier;
use crate::models::errors::ApiError;
use crate::models::tokens::{Cw20BalanceResponse, Cw20TokenInfo, TokenDescriptor};

fn parse_amount(raw: &str, what: &str) -> Result<BigUint, ApiError> {
    raw.parse::<BigUint>()
        .map_err(|_| ApiError::internal(format!("failed to parse {what} {raw}")))
}

/// Smart queries against one CW-20 contract.
pub struct Cw20Probe<'a> {
    wasm: &'a dyn WasmQueryClient,
    contract: &'a str,
    height: Option<u64>,
}

impl<'a> Cw20Probe<'a> {
    pub fn new(wasm: &'a dyn WasmQueryClient, contract: &'a str, height: Option<u64>) -> Self {
        Self { wasm, contract, height }
    }

    pub async fn code_id(&self) -> Result<u64, ApiError> {
        self.wasm
            .contract_code_id(self.contract)
            .await
            .map_err(|e| ApiError::upstream("failed to get contract info", e))
    }

    async fn query<T: DeserializeOwned>(&self, query: Value) -> Result<T, ApiError> {
        let state = self
            .wasm
            .smart_contract_state(self.contract, &query, self.height)
            .await
            .map_err(|e| ApiError::upstream("failed to get contract state", e))?;
        if state.is_empty() {
            return Err(ApiError::not_found("no response contract state"));
        }
        serde_json::from_slice(&state)
            .map_err(|e| ApiError::internal(format!("failed to unmarshal response: {e}")))
    }

    /// `token_info` of the contract. Contracts answering with neither a name nor
    /// a symbol are not tokens.
    pub async fn token_info(&self) -> Result<Cw20TokenInfo, ApiError> {
        if self.code_id().await? == 0 {
            return Err(ApiError::not_found(format!("{} is not a contract", self.contract)));
        }

        let info: Cw20TokenInfo = self.query(json!({"token_info": {}})).await?;
        if info.name.is_empty() && info.symbol.is_empty() {
            return Err(ApiError::not_found("no token info found"));
        }
        Ok(info)
    }

    pub async fn descriptor(&self) -> Result<TokenDescriptor, ApiError> {
        let info = self.token_info().await?;
        let total_supply = info
            .total_supply
            .as_deref()
            .filter(|supply| !supply.is_empty())
            .map(|supply| parse_amount(supply, "total supply"))
            .transpose()?;

        Ok(TokenDescriptor {
            symbol: Some(info.symbol).filter(|s| !s.is_empty()),
            decimals: info.decimals,
            name: Some(info.name).filter(|n| !n.is_empty()),
            total_supply,
        })
    }

    pub async fn balance_of(&self, account: &str) -> Result<BigUint, ApiError> {
        let reply: Cw20BalanceResponse = self.query(json!({"balance": {"address": account}})).await?;
        parse_amount(&reply.balance, "balance")
    }
}

/// Treats a contract as CW-20 when it answers `token_info` with a symbol.
pub struct TokenInfoVerifier<'a> {
    pub wasm: &'a dyn WasmQueryClient,
}

#[async_trait]
impl Cw20Verifier for TokenInfoVerifier<'_> {
    async fn is_cw20(&self, contract: &str) -> bool {
        match Cw20Probe::new(self.wasm, contract, None).token_info().await {
            Ok(info) => !info.symbol.is_empty(),
            Err(e) => {
                debug!("{} is not a CW-20 contract: {}", contract, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rpc::MockWasmQueryClient;
    use anyhow::anyhow;

    const CONTRACT: &str = "wasm14hj2tavq8fpesdwxxcu44rty3hh90vhujrvcmstl4zr3txmfvw9s4hmalr";

    fn with_state(code_id: u64, state: &'static str) -> MockWasmQueryClient {
        let mut wasm = MockWasmQueryClient::new();
        wasm.expect_contract_code_id().returning(move |_| Ok(code_id));
        wasm.expect_smart_contract_state()
            .returning(move |_, _, _| Ok(state.as_bytes().to_vec()));
        wasm
    }

    #[tokio::test]
    async fn descriptor_parses_total_supply_beyond_u64() {
        let wasm = with_state(
            7,
            r#"{"name":"Test Token","symbol":"TEST","decimals":6,"total_supply":"340282366920938463463374607431768211456"}"#,
        );
        let descriptor = Cw20Probe::new(&wasm, CONTRACT, None).descriptor().await.unwrap();

        assert_eq!(descriptor.symbol.as_deref(), Some("TEST"));
        assert_eq!(descriptor.decimals, 6);
        let rendered = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(rendered["totalSupply"], "340282366920938463463374607431768211456");
    }

    #[tokio::test]
    async fn token_info_failure_modes() {
        let wasm = with_state(0, "{}");
        let result = Cw20Probe::new(&wasm, CONTRACT, None).token_info().await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        let wasm = with_state(3, "");
        let result = Cw20Probe::new(&wasm, CONTRACT, None).token_info().await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        let wasm = with_state(3, "not json");
        let result = Cw20Probe::new(&wasm, CONTRACT, None).token_info().await;
        assert!(matches!(result, Err(ApiError::Internal(_))));

        let wasm = with_state(3, r#"{"name":"","symbol":"","decimals":6}"#);
        let result = Cw20Probe::new(&wasm, CONTRACT, None).token_info().await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn balance_query_is_pinned_to_height() {
        let mut wasm = MockWasmQueryClient::new();
        wasm.expect_smart_contract_state()
            .withf(|contract, query, height| {
                contract == CONTRACT && query["balance"]["address"] == "wasm1holder" && *height == Some(12)
            })
            .times(1)
            .returning(|_, _, _| Ok(br#"{"balance":"1000"}"#.to_vec()));

        let balance = Cw20Probe::new(&wasm, CONTRACT, Some(12))
            .balance_of("wasm1holder")
            .await
            .unwrap();
        assert_eq!(balance, BigUint::from(1000u32));
    }

    #[tokio::test]
    async fn verifier_requires_a_symbol() {
        let wasm = with_state(3, r#"{"name":"Only Name","symbol":"","decimals":0}"#);
        assert!(!TokenInfoVerifier { wasm: &wasm }.is_cw20(CONTRACT).await);

        let wasm = with_state(3, r#"{"name":"","symbol":"SYM","decimals":0}"#);
        assert!(TokenInfoVerifier { wasm: &wasm }.is_cw20(CONTRACT).await);

        let mut wasm = MockWasmQueryClient::new();
        wasm.expect_contract_code_id().returning(|_| Err(anyhow!("connection refused")));
        assert!(!TokenInfoVerifier { wasm: &wasm }.is_cw20(CONTRACT).await);
    }
}
