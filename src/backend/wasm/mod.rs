pub mod cw20;
pub mod messages;

use alloy_primitives::B256;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::backend::rpc::{ConsensusClient, WasmQueryClient};
use crate::backend::transformations::transactions::merge_wasm_transaction;
use crate::backend::wasm::cw20::{Cw20Probe, TokenInfoVerifier};
use crate::backend::wasm::messages::{MessageContext, MessageRegistry};
use crate::backend::ExtensionBackend;
use crate::models::common::{ChainVariant, GenericResponse};
use crate::models::errors::ApiError;
use crate::models::involvers::InvolverSet;
use crate::models::tokens::{Cw20Balances, TokenBalance, TokenDescriptor};
use crate::models::transactions::{ConsensusTxResult, TransactionView};
use crate::utils::address::{AddressNormalizer, CanonicalAddress};
use crate::utils::upper_hex;

/// Backend for chains running the CosmWasm module.
pub struct WasmBackend {
    consensus: Arc<dyn ConsensusClient>,
    wasm: Arc<dyn WasmQueryClient>,
    registry: Arc<MessageRegistry>,
    normalizer: AddressNormalizer,
    balance_concurrency: usize,
}

/// Consensus hashes are bare hex; `0x` hashes belong to the execution layer.
fn parse_consensus_hash(hash: &str) -> Option<Result<String, ApiError>> {
    let hash = hash.trim();
    if hash.starts_with("0x") || hash.starts_with("0X") {
        return None;
    }
    Some(
        hash.parse::<B256>()
            .map(|bytes| upper_hex(bytes.as_slice()))
            .map_err(|e| ApiError::invalid_argument(format!("invalid transaction hash {hash}: {e}"))),
    )
}

impl WasmBackend {
    pub fn new(
        consensus: Arc<dyn ConsensusClient>,
        wasm: Arc<dyn WasmQueryClient>,
        registry: Arc<MessageRegistry>,
        bech32_prefix: &str,
        balance_concurrency: usize,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            consensus,
            wasm,
            registry,
            normalizer: AddressNormalizer::new(ChainVariant::Cosmos, bech32_prefix)?,
            balance_concurrency: balance_concurrency.max(1),
        })
    }

    async fn consensus_tx(&self, hash: &str) -> Result<ConsensusTxResult, ApiError> {
        self.consensus
            .tx_by_hash(hash)
            .await
            .map_err(|e| ApiError::upstream("failed to get transaction", e))?
            .ok_or_else(|| ApiError::not_found("transaction not found"))
    }

    async fn balance_entry(&self, account: &CanonicalAddress, contract: CanonicalAddress) -> Result<TokenBalance, ApiError> {
        let probe = Cw20Probe::new(self.wasm.as_ref(), contract.as_str(), None);
        if probe.code_id().await? == 0 {
            return Ok(TokenBalance::empty(contract.to_string()));
        }

        let descriptor = probe.descriptor().await?;
        let balance = probe.balance_of(account.as_str()).await?;

        Ok(TokenBalance {
            display: descriptor.display(contract.as_str()),
            contract: contract.to_string(),
            decimals: descriptor.decimals,
            balance,
        })
    }
}

#[async_trait]
impl ExtensionBackend for WasmBackend {
    fn name(&self) -> &'static str {
        "wasm"
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<TransactionView>, ApiError> {
        let Some(hash) = parse_consensus_hash(hash) else {
            return Ok(None);
        };
        let result = self.consensus_tx(&hash?).await?;
        let messages = self.registry.parse_messages(&result.messages, &result.events)?;
        Ok(Some(TransactionView::Wasm(merge_wasm_transaction(result, messages))))
    }

    async fn transaction_involvers(&self, hash: &str) -> Result<Option<InvolverSet>, ApiError> {
        let Some(hash) = parse_consensus_hash(hash) else {
            return Ok(None);
        };
        let result = self.consensus_tx(&hash?).await?;

        let verifier = TokenInfoVerifier {
            wasm: self.wasm.as_ref(),
        };
        let ctx = MessageContext {
            events: &result.events,
            normalizer: &self.normalizer,
            verifier: &verifier,
        };
        self.registry.involvers(&result.messages, &ctx).await.map(Some)
    }

    async fn account_info(&self, address: &str) -> Result<Option<GenericResponse>, ApiError> {
        let Ok(contract) = self.normalizer.normalize(address) else {
            return Ok(None);
        };

        let probe = Cw20Probe::new(self.wasm.as_ref(), contract.as_str(), None);
        let code_id = probe.code_id().await?;
        if code_id == 0 {
            return Ok(None);
        }

        let mut summary = GenericResponse::new();
        summary.insert("codeId".to_string(), json!(code_id));
        match probe.descriptor().await {
            Ok(descriptor) => {
                if let Value::Object(fields) = json!(descriptor) {
                    summary.extend(fields);
                }
            }
            Err(e) => debug!("{} is not a CW-20 contract: {}", contract, e),
        }

        let mut response = GenericResponse::new();
        response.insert("contract".to_string(), Value::Object(summary));
        Ok(Some(response))
    }

    async fn module_params(&self, module: &str) -> Result<Option<Value>, ApiError> {
        if module != "wasm" && module != "cosmwasm" {
            return Ok(None);
        }
        self.consensus
            .module_params("wasm")
            .await
            .map(Some)
            .map_err(|e| ApiError::upstream("failed to get wasm params", e))
    }

    async fn cw20_contract_info(&self, contract: &str) -> Result<TokenDescriptor, ApiError> {
        let contract = self.normalizer.normalize(contract)?;
        Cw20Probe::new(self.wasm.as_ref(), contract.as_str(), None)
            .descriptor()
            .await
    }

    async fn cw20_balance(&self, account: &str, contracts: &[String]) -> Result<Cw20Balances, ApiError> {
        let account = self.normalizer.normalize(account)?;
        let contracts = contracts
            .iter()
            .map(|contract| self.normalizer.normalize(contract))
            .collect::<Result<Vec<_>, _>>()?;

        // Order is preserved and the first failure drops the whole batch
        let cw20_balances = stream::iter(contracts)
            .map(|contract| self.balance_entry(&account, contract))
            .buffered(self.balance_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(Cw20Balances {
            account: account.to_string(),
            cw20_balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rpc::{MockConsensusClient, MockWasmQueryClient};
    use crate::models::messages::CosmosMessage;
    use crate::models::transactions::{ConsensusEvent, EventAttribute};
    use bech32::{Bech32, Hrp};

    fn bech(bytes: &[u8]) -> String {
        bech32::encode::<Bech32>(Hrp::parse("wasm").unwrap(), bytes).unwrap()
    }

    fn backend(consensus: MockConsensusClient, wasm: MockWasmQueryClient) -> WasmBackend {
        WasmBackend::new(Arc::new(consensus), Arc::new(wasm), Arc::new(MessageRegistry::new()), "wasm", 2).unwrap()
    }

    #[tokio::test]
    async fn evm_hashes_are_not_intercepted() {
        let backend = backend(MockConsensusClient::new(), MockWasmQueryClient::new());
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(backend.transaction_by_hash(&hash).await.unwrap().is_none());
        assert!(matches!(
            backend.transaction_by_hash("zz").await,
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn transaction_view_parses_messages() {
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let message: CosmosMessage = serde_json::from_value(json!({
            "@type": "/cosmwasm.wasm.v1.MsgClearAdmin",
            "sender": sender,
            "contract": contract
        }))
        .unwrap();

        let mut consensus = MockConsensusClient::new();
        consensus
            .expect_tx_by_hash()
            .withf(|hash| hash == "AB".repeat(32))
            .returning(move |hash| {
                Ok(Some(ConsensusTxResult {
                    hash: hash.to_string(),
                    height: 10,
                    code: 0,
                    messages: vec![message.clone()],
                    ..Default::default()
                }))
            });
        let backend = backend(consensus, MockWasmQueryClient::new());

        let view = backend.transaction_by_hash(&"ab".repeat(32)).await.unwrap().unwrap();
        let TransactionView::Wasm(record) = view else {
            panic!("expected a wasm view");
        };
        assert!(record.result.success);
        assert_eq!(record.messages[0]["content"], format!("{sender} cleared admin of contract {contract}"));
    }

    #[tokio::test]
    async fn cw20_verification_uses_the_emitting_contract() {
        let sender = bech(&[1u8; 20]);
        let router = bech(&[8u8; 32]);
        let token = bech(&[9u8; 32]);
        let to = bech(&[3u8; 20]);
        let message: CosmosMessage = serde_json::from_value(json!({
            "@type": "/cosmwasm.wasm.v1.MsgExecuteContract",
            "sender": sender,
            "contract": router,
            "msg": {"swap": {}},
            "funds": []
        }))
        .unwrap();
        let events = vec![ConsensusEvent {
            kind: "wasm".to_string(),
            attributes: [
                ("_contract_address", token.as_str()),
                ("action", "transfer"),
                ("from", router.as_str()),
                ("to", to.as_str()),
                ("amount", "7"),
            ]
            .iter()
            .map(|(key, value)| EventAttribute {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect(),
        }];

        let mut consensus = MockConsensusClient::new();
        consensus.expect_tx_by_hash().returning(move |_| {
            Ok(Some(ConsensusTxResult {
                events: events.clone(),
                messages: vec![message.clone()],
                ..Default::default()
            }))
        });

        let mut wasm = MockWasmQueryClient::new();
        let verified = token.clone();
        wasm.expect_contract_code_id()
            .withf(move |contract| contract == verified)
            .times(1)
            .returning(|_| Ok(1));
        wasm.expect_smart_contract_state()
            .returning(|_, _, _| Ok(br#"{"name":"Token","symbol":"TKN","decimals":6}"#.to_vec()));

        let backend = backend(consensus, wasm);
        let involvers = backend
            .transaction_involvers(&"cd".repeat(32))
            .await
            .unwrap()
            .unwrap();
        assert!(involvers.contains(crate::models::involvers::InvolverRole::Erc20, &to));
    }

    #[tokio::test]
    async fn batch_skips_addresses_without_contracts() {
        let empty = bech(&[5u8; 32]);
        let token = bech(&[9u8; 32]);
        let holder = bech(&[1u8; 20]);

        let mut wasm = MockWasmQueryClient::new();
        let empty_contract = empty.clone();
        wasm.expect_contract_code_id()
            .returning(move |contract| Ok(if contract == empty_contract { 0 } else { 4 }));
        let queried = empty.clone();
        wasm.expect_smart_contract_state()
            .withf(move |contract, _, _| contract != queried)
            .returning(|_, query, _| {
                if query.get("token_info").is_some() {
                    Ok(br#"{"name":"Token","symbol":"","decimals":6}"#.to_vec())
                } else {
                    Ok(br#"{"balance":"25"}"#.to_vec())
                }
            });

        let balances = backend(MockConsensusClient::new(), wasm)
            .cw20_balance(&holder, &[empty.clone(), token.clone()])
            .await
            .unwrap();

        let rendered = serde_json::to_value(&balances).unwrap();
        assert_eq!(
            rendered["cw20Balances"][0],
            json!({"contract": empty, "display": "", "decimals": 0, "balance": "0"})
        );
        assert_eq!(rendered["cw20Balances"][1]["display"], "Token");
        assert_eq!(rendered["cw20Balances"][1]["balance"], "25");
    }

    #[tokio::test]
    async fn module_params_accept_both_names() {
        let mut consensus = MockConsensusClient::new();
        consensus
            .expect_module_params()
            .withf(|module| module == "wasm")
            .times(2)
            .returning(|_| Ok(json!({"instantiate_default_permission": "Everybody"})));
        let backend = backend(consensus, MockWasmQueryClient::new());

        assert!(backend.module_params("wasm").await.unwrap().is_some());
        assert!(backend.module_params("cosmwasm").await.unwrap().is_some());
        assert!(backend.module_params("evm").await.unwrap().is_none());
    }
}
