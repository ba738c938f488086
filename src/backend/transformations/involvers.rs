use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::backend::transformations::logs::LogClassifier;
use crate::models::errors::ApiError;
use crate::models::involvers::{InvolverRole, InvolverSet};
use crate::models::transactions::{ConsensusEvent, ReceiptData};
use crate::utils::address::AddressNormalizer;

pub const WASM_EVENT: &str = "wasm";
pub const CONTRACT_ADDRESS_ATTRIBUTE: &str = "_contract_address";
const CW20_TRANSFER_ATTRIBUTES: [&str; 5] = [CONTRACT_ADDRESS_ATTRIBUTE, "action", "from", "to", "amount"];

/// Addresses touched by an execution-layer transaction: the receipt's sender and
/// target, every log emitter, and the participants of recognized events.
pub fn evm_involvers(normalizer: &AddressNormalizer, receipt: &ReceiptData) -> Result<InvolverSet, ApiError> {
    let mut involvers = InvolverSet::new();

    involvers.insert(InvolverRole::Generic, normalizer.from_evm(receipt.from)?);
    if let Some(target) = receipt.to.or(receipt.contract_address) {
        involvers.insert(InvolverRole::Generic, normalizer.from_evm(target)?);
    }

    for log in &receipt.logs {
        involvers.insert(InvolverRole::Generic, normalizer.from_evm(log.address)?);

        if let Some(classified) = log.classify() {
            for address in classified.addresses {
                involvers.insert(classified.role, normalizer.from_evm(address)?);
            }
        }
    }

    Ok(involvers)
}

/// Decides whether a wasm contract is a CW-20 token.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Cw20Verifier: Send + Sync {
    async fn is_cw20(&self, contract: &str) -> bool;
}

/// A CW-20 `transfer` as reported by a `wasm` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cw20Transfer {
    pub contract: String,
    pub from: String,
    pub to: String,
    pub amount: String,
}

/// Every `wasm` event carrying the full transfer attribute set with
/// `action = transfer`, in event order.
pub fn cw20_transfers(events: &[ConsensusEvent]) -> Vec<Cw20Transfer> {
    events
        .iter()
        .filter_map(|event| event.attributes_if_all(WASM_EVENT, &CW20_TRANSFER_ATTRIBUTES))
        .filter(|kv| kv.get("action").is_some_and(|action| action == "transfer"))
        .map(|mut kv| Cw20Transfer {
            contract: kv.remove(CONTRACT_ADDRESS_ATTRIBUTE).unwrap_or_default(),
            from: kv.remove("from").unwrap_or_default(),
            to: kv.remove("to").unwrap_or_default(),
            amount: kv.remove("amount").unwrap_or_default(),
        })
        .collect()
}

/// Adds `address` under `role` if it normalizes; chain-reported values that do
/// not are skipped.
pub fn insert_text(involvers: &mut InvolverSet, normalizer: &AddressNormalizer, role: InvolverRole, address: &str) {
    match normalizer.normalize(address) {
        Ok(canonical) => {
            involvers.insert(role, canonical);
        }
        Err(e) => debug!("Skipping involver {:?}: {}", address, e),
    }
}

/// Addresses touched by a wasm contract execution. Every event attribute value
/// that is itself an account address counts as a generic involver. Parties of
/// CW-20 transfers are promoted to the token role once the emitting contract is
/// confirmed to be a CW-20; verdicts are cached for this call only.
pub async fn wasm_execute_involvers<V>(
    normalizer: &AddressNormalizer,
    sender: &str,
    contract: &str,
    events: &[ConsensusEvent],
    verifier: &V,
) -> InvolverSet
where
    V: Cw20Verifier + ?Sized,
{
    let mut involvers = InvolverSet::new();
    insert_text(&mut involvers, normalizer, InvolverRole::Generic, sender);
    insert_text(&mut involvers, normalizer, InvolverRole::Generic, contract);

    for attribute in events.iter().flat_map(|event| &event.attributes) {
        if normalizer.is_account_address(&attribute.value) {
            insert_text(&mut involvers, normalizer, InvolverRole::Generic, &attribute.value);
        }
    }

    let mut verdicts: HashMap<String, bool> = HashMap::new();
    for transfer in cw20_transfers(events) {
        let is_cw20 = match verdicts.get(&transfer.contract) {
            Some(verdict) => *verdict,
            None => {
                let verdict = verifier.is_cw20(&transfer.contract).await;
                verdicts.insert(transfer.contract.clone(), verdict);
                verdict
            }
        };

        if is_cw20 {
            insert_text(&mut involvers, normalizer, InvolverRole::Erc20, &transfer.from);
            insert_text(&mut involvers, normalizer, InvolverRole::Erc20, &transfer.to);
        }
    }

    involvers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::ChainVariant;
    use crate::models::transactions::EventAttribute;
    use alloy_primitives::{address, Address, Bytes, Log, LogData, B256};
    use bech32::{Bech32, Hrp};
    use std::collections::BTreeSet;

    const SENDER: Address = address!("1111111111111111111111111111111111111111");
    const TOKEN: Address = address!("2222222222222222222222222222222222222222");
    const ALICE: Address = address!("d8da6bf26964af9d7eed9e03e53415d37aa96045");
    const BOB: Address = address!("ab5801a7d398351b8be11c439e05c5b3259aec9b");

    fn evm() -> AddressNormalizer {
        AddressNormalizer::new(ChainVariant::Evm, "evmos").unwrap()
    }

    fn cosmos() -> AddressNormalizer {
        AddressNormalizer::new(ChainVariant::Cosmos, "wasm").unwrap()
    }

    fn transfer_log(emitter: Address, from: Address, to: Address) -> Log {
        let signature = crate::backend::transformations::logs::EVENT_PATTERNS[0].signature;
        Log {
            address: emitter,
            data: LogData::new_unchecked(
                vec![signature, from.into_word(), to.into_word()],
                Bytes::from(B256::with_last_byte(5).to_vec()),
            ),
        }
    }

    fn receipt(logs: Vec<Log>) -> ReceiptData {
        ReceiptData {
            status: Some(true),
            from: SENDER,
            to: Some(TOKEN),
            contract_address: None,
            logs,
            body: serde_json::Value::Null,
        }
    }

    fn canonical(normalizer: &AddressNormalizer, address: Address) -> String {
        normalizer.from_evm(address).unwrap().to_string()
    }

    #[test]
    fn erc20_transfer_parties_get_token_role_only() {
        let normalizer = evm();
        let involvers = evm_involvers(&normalizer, &receipt(vec![transfer_log(TOKEN, ALICE, BOB)])).unwrap();

        assert_eq!(involvers.len(InvolverRole::Erc20), 2);
        assert!(involvers.contains(InvolverRole::Erc20, &canonical(&normalizer, ALICE)));
        assert!(involvers.contains(InvolverRole::Erc20, &canonical(&normalizer, BOB)));
        assert!(!involvers.contains(InvolverRole::Generic, &canonical(&normalizer, ALICE)));
        assert!(!involvers.contains(InvolverRole::Generic, &canonical(&normalizer, BOB)));
        // sender and token contract, the emitter deduplicated against `to`
        assert_eq!(involvers.len(InvolverRole::Generic), 2);
    }

    #[test]
    fn unmatched_logs_contribute_only_their_emitter() {
        let normalizer = evm();
        let mut log = transfer_log(BOB, ALICE, BOB);
        log.data = LogData::new_unchecked(vec![B256::repeat_byte(0xab), ALICE.into_word()], Bytes::new());

        let involvers = evm_involvers(&normalizer, &receipt(vec![log])).unwrap();
        assert!(involvers.contains(InvolverRole::Generic, &canonical(&normalizer, BOB)));
        assert!(!involvers.contains(InvolverRole::Generic, &canonical(&normalizer, ALICE)));
        assert_eq!(involvers.len(InvolverRole::Erc20), 0);
    }

    #[test]
    fn contract_creation_seeds_created_address() {
        let normalizer = evm();
        let mut creation = receipt(vec![]);
        creation.to = None;
        creation.contract_address = Some(BOB);

        let involvers = evm_involvers(&normalizer, &creation).unwrap();
        assert!(involvers.contains(InvolverRole::Generic, &canonical(&normalizer, BOB)));
    }

    #[test]
    fn involvers_come_only_from_receipt_logs_and_topics() {
        let normalizer = cosmos();
        let logs = vec![
            transfer_log(TOKEN, ALICE, BOB),
            transfer_log(BOB, ALICE, SENDER),
        ];
        let allowed: BTreeSet<String> = [SENDER, TOKEN, ALICE, BOB]
            .into_iter()
            .map(|a| canonical(&normalizer, a))
            .collect();

        let involvers = evm_involvers(&normalizer, &receipt(logs)).unwrap();
        for address in involvers.all_addresses() {
            assert!(allowed.contains(address.as_str()), "unexpected involver {address}");
        }
    }

    fn bech(bytes: &[u8]) -> String {
        bech32::encode::<Bech32>(Hrp::parse("wasm").unwrap(), bytes).unwrap()
    }

    fn event(kind: &str, attributes: &[(&str, &str)]) -> ConsensusEvent {
        ConsensusEvent {
            kind: kind.to_string(),
            attributes: attributes
                .iter()
                .map(|(key, value)| EventAttribute {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn cw20_transfers_are_promoted_after_verification() {
        let normalizer = cosmos();
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let from = bech(&[2u8; 20]);
        let to = bech(&[3u8; 20]);
        let transfer = [
            ("_contract_address", contract.as_str()),
            ("action", "transfer"),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("amount", "100"),
        ];
        let events = vec![event("wasm", &transfer), event("wasm", &transfer)];

        let mut verifier = MockCw20Verifier::new();
        verifier
            .expect_is_cw20()
            .withf({
                let contract = contract.clone();
                move |c| *c == contract
            })
            .times(1)
            .return_const(true);

        let involvers = wasm_execute_involvers(&normalizer, &sender, &contract, &events, &verifier).await;

        assert!(involvers.contains(InvolverRole::Erc20, &from));
        assert!(involvers.contains(InvolverRole::Erc20, &to));
        assert!(involvers.contains(InvolverRole::Generic, &sender));
        assert!(involvers.contains(InvolverRole::Generic, &contract));
        assert!(involvers.contains(InvolverRole::Generic, &from));
    }

    #[tokio::test]
    async fn non_cw20_contracts_keep_parties_generic() {
        let normalizer = cosmos();
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let to = bech(&[3u8; 20]);
        let events = vec![event(
            "wasm",
            &[
                ("_contract_address", contract.as_str()),
                ("action", "transfer"),
                ("from", sender.as_str()),
                ("to", to.as_str()),
                ("amount", "1"),
            ],
        )];

        let mut verifier = MockCw20Verifier::new();
        verifier.expect_is_cw20().times(1).return_const(false);

        let involvers = wasm_execute_involvers(&normalizer, &sender, &contract, &events, &verifier).await;
        assert_eq!(involvers.len(InvolverRole::Erc20), 0);
        assert!(involvers.contains(InvolverRole::Generic, &to));
    }

    #[tokio::test]
    async fn non_address_attributes_are_ignored() {
        let normalizer = cosmos();
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let events = vec![
            event("message", &[("action", "/cosmwasm.wasm.v1.MsgExecuteContract"), ("module", "wasm")]),
            event("wasm", &[("_contract_address", contract.as_str()), ("action", "mint"), ("amount", "7")]),
        ];

        let mut verifier = MockCw20Verifier::new();
        verifier.expect_is_cw20().never();

        let involvers = wasm_execute_involvers(&normalizer, &sender, &contract, &events, &verifier).await;
        assert_eq!(involvers.all_addresses().len(), 2);
    }
}
