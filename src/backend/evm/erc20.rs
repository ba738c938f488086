use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolValue;
use num_bigint::BigUint;
use tracing::debug;

use crate::backend::rpc::ExecutionClient;
use crate::models::errors::ApiError;
use crate::models::tokens::TokenDescriptor;

pub const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
pub const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Decodes a string return value. Some early tokens return `bytes32` instead of
/// an ABI string; those are accepted with trailing zeros trimmed.
pub fn decode_string(ret: &[u8]) -> Option<String> {
    if let Ok(value) = String::abi_decode(ret) {
        return Some(value);
    }
    if ret.len() == 32 {
        let end = ret.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        return String::from_utf8(ret[..end].to_vec()).ok();
    }
    None
}

/// Read-only calls against one ERC-20 contract, all pinned to one block.
pub struct Erc20Probe<'a> {
    execution: &'a dyn ExecutionClient,
    contract: Address,
    block: u64,
}

impl<'a> Erc20Probe<'a> {
    pub fn new(execution: &'a dyn ExecutionClient, contract: Address, block: u64) -> Self {
        Self {
            execution,
            contract,
            block,
        }
    }

    async fn call(&self, selector: [u8; 4], args: &[u8]) -> anyhow::Result<Bytes> {
        let mut input = selector.to_vec();
        input.extend_from_slice(args);
        self.execution.call(self.contract, Bytes::from(input), self.block).await
    }

    async fn call_string(&self, selector: [u8; 4], field: &str) -> Option<String> {
        match self.call(selector, &[]).await {
            Ok(ret) => {
                let decoded = decode_string(&ret);
                if decoded.is_none() {
                    debug!("{} of {} did not decode as a string", field, self.contract);
                }
                decoded
            }
            Err(e) => {
                debug!("{} of {} unavailable: {:#}", field, self.contract, e);
                None
            }
        }
    }

    /// Mandatory: a token without decimals cannot be displayed.
    pub async fn decimals(&self) -> Result<u8, ApiError> {
        let ret = self
            .call(DECIMALS_SELECTOR, &[])
            .await
            .map_err(|e| ApiError::upstream(&format!("failed to get decimals of {}", self.contract), e))?;
        if ret.is_empty() {
            return Err(ApiError::internal(format!("{} returned no decimals", self.contract)));
        }
        u8::try_from(&BigUint::from_bytes_be(&ret))
            .map_err(|_| ApiError::internal(format!("decimals of {} out of range", self.contract)))
    }

    /// Display label: `symbol()`, falling back to `name()`.
    pub async fn symbol(&self) -> Option<String> {
        match self.call_string(SYMBOL_SELECTOR, "symbol").await {
            Some(symbol) => Some(symbol),
            None => self.call_string(NAME_SELECTOR, "name").await,
        }
    }

    pub async fn name(&self) -> Option<String> {
        self.call_string(NAME_SELECTOR, "name").await
    }

    pub async fn balance_of(&self, account: Address) -> Result<BigUint, ApiError> {
        let ret = self
            .call(BALANCE_OF_SELECTOR, account.into_word().as_slice())
            .await
            .map_err(|e| {
                ApiError::upstream(&format!("failed to get balance of {account} on contract {}", self.contract), e)
            })?;
        if ret.is_empty() {
            return Err(ApiError::internal(format!("{} returned no balance", self.contract)));
        }
        Ok(BigUint::from_bytes_be(&ret))
    }

    pub async fn descriptor(&self) -> Result<TokenDescriptor, ApiError> {
        let decimals = self.decimals().await?;
        let symbol = self.symbol().await;
        let name = self.name().await;

        Ok(TokenDescriptor {
            symbol,
            decimals,
            name,
            total_supply: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rpc::MockExecutionClient;
    use alloy_primitives::{address, B256};
    use anyhow::anyhow;

    const TOKEN: Address = address!("d4949664cd82660aae99bedc034a0dea8a0bd517");

    fn word(value: u8) -> Bytes {
        Bytes::from(B256::with_last_byte(value).to_vec())
    }

    fn selector_of(input: &Bytes) -> [u8; 4] {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&input[..4]);
        selector
    }

    #[test]
    fn strings_decode_from_abi_or_bytes32() {
        assert_eq!(decode_string(&"USDC".to_string().abi_encode()).as_deref(), Some("USDC"));

        let mut fixed = [0u8; 32];
        fixed[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_string(&fixed).as_deref(), Some("MKR"));

        assert_eq!(decode_string(&[1, 2, 3]), None);
    }

    #[tokio::test]
    async fn symbol_falls_back_to_name() {
        let mut execution = MockExecutionClient::new();
        execution.expect_call().returning(|_, input, _| match selector_of(&input) {
            SYMBOL_SELECTOR => Err(anyhow!("execution reverted")),
            NAME_SELECTOR => Ok(Bytes::from("Wrapped Ether".to_string().abi_encode())),
            DECIMALS_SELECTOR => Ok(word(18)),
            _ => Err(anyhow!("unexpected selector")),
        });

        let descriptor = Erc20Probe::new(&execution, TOKEN, 10).descriptor().await.unwrap();
        assert_eq!(descriptor.symbol.as_deref(), Some("Wrapped Ether"));
        assert_eq!(descriptor.name.as_deref(), Some("Wrapped Ether"));
        assert_eq!(descriptor.decimals, 18);
    }

    #[tokio::test]
    async fn missing_symbol_and_name_still_yield_a_descriptor() {
        let mut execution = MockExecutionClient::new();
        execution.expect_call().returning(|_, input, _| match selector_of(&input) {
            DECIMALS_SELECTOR => Ok(word(6)),
            _ => Err(anyhow!("execution reverted")),
        });

        let descriptor = Erc20Probe::new(&execution, TOKEN, 10).descriptor().await.unwrap();
        assert_eq!(descriptor.symbol, None);
        assert_eq!(descriptor.name, None);
        assert_eq!(descriptor.decimals, 6);

        let rendered = serde_json::to_value(&descriptor).unwrap();
        assert!(rendered.get("symbol").is_none());
        assert_eq!(rendered["decimals"], 6);
    }

    #[tokio::test]
    async fn decimals_failure_is_internal() {
        let mut execution = MockExecutionClient::new();
        execution
            .expect_call()
            .returning(|_, _, _| Err(anyhow!("execution reverted")));

        let result = Erc20Probe::new(&execution, TOKEN, 10).descriptor().await;
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn calls_are_pinned_and_balance_is_padded() {
        let holder = address!("d8da6bf26964af9d7eed9e03e53415d37aa96045");
        let mut execution = MockExecutionClient::new();
        execution
            .expect_call()
            .withf(move |contract, input, block| {
                *contract == TOKEN
                    && *block == 77
                    && input.len() == 36
                    && input[..4] == BALANCE_OF_SELECTOR
                    && input[4..16] == [0u8; 12]
                    && &input[16..] == holder.as_slice()
            })
            .times(1)
            .returning(|_, _, _| {
                // 2^72, beyond 64 bits
                let mut ret = [0u8; 32];
                ret[22] = 1;
                Ok(Bytes::from(ret.to_vec()))
            });

        let balance = Erc20Probe::new(&execution, TOKEN, 77).balance_of(holder).await.unwrap();
        assert_eq!(balance.to_string(), "4722366482869645213696");
    }
}
