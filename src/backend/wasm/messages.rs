use alloy_primitives::hex;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::backend::transformations::involvers::{
    cw20_transfers, insert_text, wasm_execute_involvers, Cw20Verifier, CONTRACT_ADDRESS_ATTRIBUTE,
};
use crate::models::common::GenericResponse;
use crate::models::errors::ApiError;
use crate::models::involvers::{InvolverRole, InvolverSet};
use crate::models::messages::{
    AccessConfig, CosmosMessage, MessageKind, MsgClearAdmin, MsgExecuteContract, MsgIbcCloseChannel, MsgIbcSend,
    MsgInstantiateContract, MsgMigrateContract, MsgStoreCode, MsgUpdateAdmin, MsgUpdateInstantiateConfig,
};
use crate::models::transactions::ConsensusEvent;
use crate::utils::address::AddressNormalizer;

const STORE_CODE_EVENT: &str = "store_code";
const INSTANTIATE_EVENT: &str = "instantiate";
const CODE_ID_ATTRIBUTE: &str = "code_id";
const CHECKSUM_ATTRIBUTE: &str = "code_checksum";

/// Everything a handler may look at besides the message itself.
pub struct MessageContext<'a> {
    pub events: &'a [ConsensusEvent],
    pub normalizer: &'a AddressNormalizer,
    pub verifier: &'a dyn Cw20Verifier,
}

/// Explorer view and involver extraction for one message kind.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn parse(&self, message: &CosmosMessage, events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError>;

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError>;
}

fn decode<T: DeserializeOwned>(message: &CosmosMessage) -> Result<T, ApiError> {
    message
        .decode()
        .map_err(|e| ApiError::internal(format!("failed to decode {}: {e}", message.type_url)))
}

/// First value of `key` in the first event of type `kind`.
fn first_event_attribute<'a>(events: &'a [ConsensusEvent], kind: &str, key: &str) -> Option<&'a str> {
    events
        .iter()
        .find(|event| event.kind == kind)
        .and_then(|event| event.attribute(key))
        .filter(|value| !value.is_empty())
}

fn permission_view(permission: &AccessConfig) -> Value {
    json!({
        "permission": permission.permission,
        "addresses": permission.addresses,
    })
}

/// Nested contract messages are echoed only when they are JSON objects.
fn object_or_none(msg: &Value) -> Option<Value> {
    msg.is_object().then(|| msg.clone())
}

/// Builds the one-line human readable summary of a message.
#[derive(Default)]
struct Content(String);

impl Content {
    fn text(mut self, text: &str) -> Self {
        self.0.push_str(text);
        self
    }

    fn address(mut self, address: &str) -> Self {
        self.0.push_str(address);
        self
    }

    fn into_response(self, response: &mut GenericResponse) {
        response.insert("content".to_string(), Value::String(self.0));
    }
}

fn response(pairs: Vec<(&str, Value)>) -> GenericResponse {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn generic(normalizer: &AddressNormalizer, addresses: &[&str]) -> InvolverSet {
    let mut involvers = InvolverSet::new();
    for address in addresses.iter().filter(|a| !a.is_empty()) {
        insert_text(&mut involvers, normalizer, InvolverRole::Generic, address);
    }
    involvers
}

struct StoreCodeHandler;

#[async_trait]
impl MessageHandler for StoreCodeHandler {
    fn parse(&self, message: &CosmosMessage, events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgStoreCode = decode(message)?;
        let mut res = response(vec![("sender", json!(msg.sender))]);
        if let Some(permission) = &msg.instantiate_permission {
            res.insert("instantiatePermission".to_string(), permission_view(permission));
        }

        let mut content = Content::default().address(&msg.sender).text(" has stored new contract bytecode");
        if let Some(code_id) = first_event_attribute(events, STORE_CODE_EVENT, CODE_ID_ATTRIBUTE) {
            res.insert("codeId".to_string(), json!(code_id));
            content = content.text(", code-id = ").text(code_id);
        }
        if let Some(checksum) = first_event_attribute(events, STORE_CODE_EVENT, CHECKSUM_ATTRIBUTE) {
            res.insert("checksum".to_string(), json!(checksum));
            content = content.text(", checksum = ").text(checksum);
        }
        content.text(" into chain").into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgStoreCode = decode(message)?;
        let mut addresses = vec![msg.sender.as_str()];
        if let Some(permission) = &msg.instantiate_permission {
            addresses.extend(permission.addresses.iter().map(String::as_str));
        }
        Ok(generic(ctx.normalizer, &addresses))
    }
}

/// Both instantiate messages share one shape; the second only adds a salt.
struct InstantiateHandler;

#[async_trait]
impl MessageHandler for InstantiateHandler {
    fn parse(&self, message: &CosmosMessage, events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgInstantiateContract = decode(message)?;
        let mut res = response(vec![
            ("sender", json!(msg.sender)),
            ("codeId", json!(msg.code_id)),
            ("msg", msg.msg.clone()),
        ]);
        if !msg.admin.is_empty() {
            res.insert("admin".to_string(), json!(msg.admin));
        }
        if let Some(ctor) = object_or_none(&msg.msg) {
            res.insert("ctorMsg".to_string(), ctor);
        }

        let mut content = Content::default().address(&msg.sender).text(" has deployed new contract");
        if let Some(contract) = first_event_attribute(events, INSTANTIATE_EVENT, CONTRACT_ADDRESS_ATTRIBUTE) {
            res.insert("contractAddress".to_string(), json!(contract));
            content = content.text(" ").address(contract);
        }
        content
            .text(" with code-id ")
            .text(&msg.code_id.to_string())
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgInstantiateContract = decode(message)?;
        let contract = first_event_attribute(ctx.events, INSTANTIATE_EVENT, CONTRACT_ADDRESS_ATTRIBUTE).unwrap_or_default();
        Ok(generic(ctx.normalizer, &[msg.sender.as_str(), contract]))
    }
}

struct ClearAdminHandler;

#[async_trait]
impl MessageHandler for ClearAdminHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgClearAdmin = decode(message)?;
        let mut res = response(vec![("sender", json!(msg.sender)), ("contract", json!(msg.contract))]);
        Content::default()
            .address(&msg.sender)
            .text(" cleared admin of contract ")
            .address(&msg.contract)
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgClearAdmin = decode(message)?;
        Ok(generic(ctx.normalizer, &[msg.sender.as_str(), msg.contract.as_str()]))
    }
}

struct ExecuteContractHandler;

#[async_trait]
impl MessageHandler for ExecuteContractHandler {
    fn parse(&self, message: &CosmosMessage, events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgExecuteContract = decode(message)?;
        let funds: serde_json::Map<String, Value> = msg
            .funds
            .iter()
            .map(|coin| (coin.denom.clone(), json!(coin.amount)))
            .collect();
        let mut res = response(vec![
            ("sender", json!(msg.sender)),
            ("contract", json!(msg.contract)),
            ("funds", Value::Object(funds)),
        ]);
        if let Some(input) = object_or_none(&msg.msg) {
            res.insert("inputMsg".to_string(), input);
        }

        let transfers: Vec<Value> = cw20_transfers(events)
            .into_iter()
            .map(|t| json!({"from": t.from, "to": t.to, "amount": t.amount}))
            .collect();
        let mut action = GenericResponse::new();
        if !transfers.is_empty() {
            action.insert("transfers".to_string(), Value::Array(transfers));
        }
        res.insert("action".to_string(), Value::Object(action));

        Content::default()
            .address(&msg.sender)
            .text(" executes contract ")
            .address(&msg.contract)
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgExecuteContract = decode(message)?;
        Ok(wasm_execute_involvers(ctx.normalizer, &msg.sender, &msg.contract, ctx.events, ctx.verifier).await)
    }
}

struct IbcCloseChannelHandler;

#[async_trait]
impl MessageHandler for IbcCloseChannelHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgIbcCloseChannel = decode(message)?;
        let mut res = response(vec![("channel", json!(msg.channel))]);
        Content::default()
            .text("Wasm close IBC channel ")
            .text(&msg.channel)
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, _message: &CosmosMessage, _ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        Ok(InvolverSet::new())
    }
}

struct IbcSendHandler;

#[async_trait]
impl MessageHandler for IbcSendHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgIbcSend = decode(message)?;
        // The gateway renders packet bytes as base64; explorers show hex
        let data = STANDARD
            .decode(msg.data.as_bytes())
            .map(hex::encode)
            .unwrap_or_else(|_| msg.data.clone());
        let mut res = response(vec![
            ("channel", json!(msg.channel)),
            ("data", json!(data)),
            ("timeoutHeight", json!(msg.timeout_height)),
            ("timeoutTimestampNanos", json!(msg.timeout_timestamp)),
        ]);

        let mut content = Content::default().text("Wasm IBC send via channel ").text(&msg.channel);
        content = if msg.timeout_height > 0 {
            content
                .text(" with timeout-block-height ")
                .text(&msg.timeout_height.to_string())
        } else {
            content.text(" without timeout-block-height")
        };
        content = if msg.timeout_timestamp > 0 {
            content
                .text(" with timeout-timestamp ")
                .text(&format!("{} seconds", msg.timeout_timestamp / 1_000_000_000))
        } else {
            content.text(" without timeout-timestamp")
        };
        content.into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, _message: &CosmosMessage, _ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        Ok(InvolverSet::new())
    }
}

struct MigrateContractHandler;

#[async_trait]
impl MessageHandler for MigrateContractHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgMigrateContract = decode(message)?;
        let mut res = response(vec![
            ("sender", json!(msg.sender)),
            ("contract", json!(msg.contract)),
            ("codeId", json!(msg.code_id)),
        ]);
        if let Some(migration) = object_or_none(&msg.msg) {
            res.insert("migrationMsg".to_string(), migration);
        }
        Content::default()
            .address(&msg.sender)
            .text(" migrates contract ")
            .address(&msg.contract)
            .text(" to new code-id ")
            .text(&msg.code_id.to_string())
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgMigrateContract = decode(message)?;
        Ok(generic(ctx.normalizer, &[msg.sender.as_str(), msg.contract.as_str()]))
    }
}

struct UpdateAdminHandler;

#[async_trait]
impl MessageHandler for UpdateAdminHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgUpdateAdmin = decode(message)?;
        let mut res = response(vec![
            ("sender", json!(msg.sender)),
            ("contract", json!(msg.contract)),
            ("newAdmin", json!(msg.new_admin)),
        ]);
        Content::default()
            .address(&msg.sender)
            .text(" updated admin for contract ")
            .address(&msg.contract)
            .text(" to ")
            .address(&msg.new_admin)
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgUpdateAdmin = decode(message)?;
        Ok(generic(ctx.normalizer, &[msg.sender.as_str(), msg.contract.as_str(), msg.new_admin.as_str()]))
    }
}

struct UpdateInstantiateConfigHandler;

#[async_trait]
impl MessageHandler for UpdateInstantiateConfigHandler {
    fn parse(&self, message: &CosmosMessage, _events: &[ConsensusEvent]) -> Result<GenericResponse, ApiError> {
        let msg: MsgUpdateInstantiateConfig = decode(message)?;
        let mut res = response(vec![("sender", json!(msg.sender)), ("codeId", json!(msg.code_id))]);
        if let Some(permission) = &msg.new_instantiate_permission {
            res.insert("instantiatePermission".to_string(), permission_view(permission));
        }
        Content::default()
            .address(&msg.sender)
            .text(" updated init config for code-id ")
            .text(&msg.code_id.to_string())
            .into_response(&mut res);
        Ok(res)
    }

    async fn involvers(&self, message: &CosmosMessage, ctx: &MessageContext<'_>) -> Result<InvolverSet, ApiError> {
        let msg: MsgUpdateInstantiateConfig = decode(message)?;
        Ok(generic(ctx.normalizer, &[msg.sender.as_str()]))
    }
}

fn handler_for(kind: MessageKind) -> Box<dyn MessageHandler> {
    match kind {
        MessageKind::StoreCode => Box::new(StoreCodeHandler),
        MessageKind::InstantiateContract | MessageKind::InstantiateContract2 => Box::new(InstantiateHandler),
        MessageKind::ClearAdmin => Box::new(ClearAdminHandler),
        MessageKind::ExecuteContract => Box::new(ExecuteContractHandler),
        MessageKind::IbcCloseChannel => Box::new(IbcCloseChannelHandler),
        MessageKind::IbcSend => Box::new(IbcSendHandler),
        MessageKind::MigrateContract => Box::new(MigrateContractHandler),
        MessageKind::UpdateAdmin => Box::new(UpdateAdminHandler),
        MessageKind::UpdateInstantiateConfig => Box::new(UpdateInstantiateConfigHandler),
    }
}

/// Handlers for every CosmWasm message kind, built once and shared by the
/// backend.
pub struct MessageRegistry {
    handlers: HashMap<MessageKind, Box<dyn MessageHandler>>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self {
            handlers: MessageKind::ALL.into_iter().map(|kind| (kind, handler_for(kind))).collect(),
        }
    }

    pub fn handler(&self, message: &CosmosMessage) -> Option<&dyn MessageHandler> {
        message
            .kind()
            .and_then(|kind| self.handlers.get(&kind))
            .map(|handler| &**handler)
    }

    /// Explorer view of every message. Messages of other modules are echoed
    /// with their type.
    pub fn parse_messages(
        &self,
        messages: &[CosmosMessage],
        events: &[ConsensusEvent],
    ) -> Result<Vec<Value>, ApiError> {
        messages
            .iter()
            .map(|message| -> Result<Value, ApiError> {
                let mut view = match self.handler(message) {
                    Some(handler) => handler.parse(message, events)?,
                    None => match &message.body {
                        Value::Object(fields) => fields.clone(),
                        _ => GenericResponse::new(),
                    },
                };
                view.insert("type".to_string(), json!(message.type_url));
                Ok(Value::Object(view))
            })
            .collect()
    }

    /// Union of the involvers of every message. Unknown kinds contribute
    /// nothing.
    pub async fn involvers(
        &self,
        messages: &[CosmosMessage],
        ctx: &MessageContext<'_>,
    ) -> Result<InvolverSet, ApiError> {
        let mut involvers = InvolverSet::new();
        for message in messages {
            match self.handler(message) {
                Some(handler) => involvers.merge(handler.involvers(message, ctx).await?),
                None => debug!("No involver extractor for {}", message.type_url),
            }
        }
        Ok(involvers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::transformations::involvers::MockCw20Verifier;
    use crate::models::common::ChainVariant;
    use crate::models::transactions::EventAttribute;
    use bech32::{Bech32, Hrp};

    fn bech(bytes: &[u8]) -> String {
        bech32::encode::<Bech32>(Hrp::parse("wasm").unwrap(), bytes).unwrap()
    }

    fn message(raw: Value) -> CosmosMessage {
        serde_json::from_value(raw).unwrap()
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

    #[test]
    fn every_kind_has_a_handler() {
        let registry = MessageRegistry::new();
        for kind in MessageKind::ALL {
            let msg = message(json!({"@type": kind.type_url()}));
            assert!(registry.handler(&msg).is_some(), "{kind:?} has no handler");
        }
    }

    #[test]
    fn execute_lists_cw20_transfers() {
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let to = bech(&[3u8; 20]);
        let msg = message(json!({
            "@type": "/cosmwasm.wasm.v1.MsgExecuteContract",
            "sender": sender,
            "contract": contract,
            "msg": {"transfer": {"recipient": to, "amount": "10"}},
            "funds": [{"denom": "uwasm", "amount": "5"}]
        }));
        let events = vec![event(
            "wasm",
            &[
                ("_contract_address", contract.as_str()),
                ("action", "transfer"),
                ("from", sender.as_str()),
                ("to", to.as_str()),
                ("amount", "10"),
            ],
        )];

        let views = MessageRegistry::new().parse_messages(&[msg], &events).unwrap();
        let view = &views[0];
        assert_eq!(view["type"], "/cosmwasm.wasm.v1.MsgExecuteContract");
        assert_eq!(view["funds"]["uwasm"], "5");
        assert_eq!(view["action"]["transfers"][0]["amount"], "10");
        assert_eq!(view["content"], format!("{sender} executes contract {contract}"));
    }

    #[test]
    fn instantiate_reads_contract_from_events() {
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let msg = message(json!({
            "@type": "/cosmwasm.wasm.v1.MsgInstantiateContract2",
            "sender": sender,
            "code_id": "42",
            "label": "pool",
            "msg": {"owner": sender},
            "salt": "c2FsdA==",
            "funds": []
        }));
        let events = vec![event("instantiate", &[("_contract_address", contract.as_str()), ("code_id", "42")])];

        let views = MessageRegistry::new().parse_messages(&[msg], &events).unwrap();
        assert_eq!(views[0]["contractAddress"], json!(contract));
        assert_eq!(views[0]["codeId"], 42);
        assert!(views[0].get("admin").is_none());
        assert_eq!(
            views[0]["content"],
            format!("{sender} has deployed new contract {contract} with code-id 42")
        );
    }

    #[test]
    fn ibc_send_renders_hex_data_and_timeouts() {
        let msg = message(json!({
            "@type": "/cosmwasm.wasm.v1.MsgIBCSend",
            "channel": "channel-0",
            "timeout_height": "0",
            "timeout_timestamp": "1700000000000000000",
            "data": STANDARD.encode([0xde, 0xad])
        }));
        let views = MessageRegistry::new().parse_messages(&[msg], &[]).unwrap();
        assert_eq!(views[0]["data"], "dead");
        assert_eq!(
            views[0]["content"],
            "Wasm IBC send via channel channel-0 without timeout-block-height with timeout-timestamp 1700000000 seconds"
        );
    }

    #[test]
    fn foreign_messages_are_echoed() {
        let msg = message(json!({"@type": "/cosmos.bank.v1beta1.MsgSend", "from_address": "a", "to_address": "b"}));
        let views = MessageRegistry::new().parse_messages(&[msg], &[]).unwrap();
        assert_eq!(views[0]["type"], "/cosmos.bank.v1beta1.MsgSend");
        assert_eq!(views[0]["to_address"], "b");
    }

    #[test]
    fn malformed_wasm_message_is_internal() {
        let msg = message(json!({"@type": "/cosmwasm.wasm.v1.MsgUpdateAdmin", "sender": "x"}));
        let result = MessageRegistry::new().parse_messages(&[msg], &[]);
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn involvers_are_merged_across_messages() {
        let normalizer = AddressNormalizer::new(ChainVariant::Cosmos, "wasm").unwrap();
        let sender = bech(&[1u8; 20]);
        let contract = bech(&[9u8; 32]);
        let admin = bech(&[4u8; 20]);
        let messages = vec![
            message(json!({
                "@type": "/cosmwasm.wasm.v1.MsgUpdateAdmin",
                "sender": sender,
                "contract": contract,
                "new_admin": admin
            })),
            message(json!({"@type": "/cosmwasm.wasm.v1.MsgIBCCloseChannel", "channel": "channel-1"})),
            message(json!({"@type": "/cosmos.bank.v1beta1.MsgSend"})),
        ];

        let mut verifier = MockCw20Verifier::new();
        verifier.expect_is_cw20().never();
        let ctx = MessageContext {
            events: &[],
            normalizer: &normalizer,
            verifier: &verifier,
        };

        let involvers = MessageRegistry::new().involvers(&messages, &ctx).await.unwrap();
        assert_eq!(involvers.len(InvolverRole::Generic), 3);
        assert!(involvers.contains(InvolverRole::Generic, &admin));
    }
}
