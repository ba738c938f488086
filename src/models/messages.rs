use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::utils::deserialize_u64;

/// A transaction message as rendered by the REST gateway: the `@type` URL plus
/// the message fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosMessage {
    pub type_url: String,
    pub body: serde_json::Value,
}

impl<'de> Deserialize<'de> for CosmosMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        let type_url = match fields.remove("@type") {
            Some(serde_json::Value::String(type_url)) => type_url,
            _ => return Err(de::Error::missing_field("@type")),
        };
        Ok(Self {
            type_url,
            body: serde_json::Value::Object(fields),
        })
    }
}

impl CosmosMessage {
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_type_url(&self.type_url)
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

/// Every message the CosmWasm module defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    StoreCode,
    InstantiateContract,
    InstantiateContract2,
    ClearAdmin,
    ExecuteContract,
    IbcCloseChannel,
    IbcSend,
    MigrateContract,
    UpdateAdmin,
    UpdateInstantiateConfig,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        MessageKind::StoreCode,
        MessageKind::InstantiateContract,
        MessageKind::InstantiateContract2,
        MessageKind::ClearAdmin,
        MessageKind::ExecuteContract,
        MessageKind::IbcCloseChannel,
        MessageKind::IbcSend,
        MessageKind::MigrateContract,
        MessageKind::UpdateAdmin,
        MessageKind::UpdateInstantiateConfig,
    ];

    pub fn type_url(self) -> &'static str {
        match self {
            Self::StoreCode => "/cosmwasm.wasm.v1.MsgStoreCode",
            Self::InstantiateContract => "/cosmwasm.wasm.v1.MsgInstantiateContract",
            Self::InstantiateContract2 => "/cosmwasm.wasm.v1.MsgInstantiateContract2",
            Self::ClearAdmin => "/cosmwasm.wasm.v1.MsgClearAdmin",
            Self::ExecuteContract => "/cosmwasm.wasm.v1.MsgExecuteContract",
            Self::IbcCloseChannel => "/cosmwasm.wasm.v1.MsgIBCCloseChannel",
            Self::IbcSend => "/cosmwasm.wasm.v1.MsgIBCSend",
            Self::MigrateContract => "/cosmwasm.wasm.v1.MsgMigrateContract",
            Self::UpdateAdmin => "/cosmwasm.wasm.v1.MsgUpdateAdmin",
            Self::UpdateInstantiateConfig => "/cosmwasm.wasm.v1.MsgUpdateInstantiateConfig",
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_url() == type_url)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub permission: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgStoreCode {
    pub sender: String,
    #[serde(default)]
    pub instantiate_permission: Option<AccessConfig>,
}

/// Shared by both instantiate messages; `salt` only appears on the second.
#[derive(Debug, Clone, Deserialize)]
pub struct MsgInstantiateContract {
    pub sender: String,
    #[serde(default)]
    pub admin: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub code_id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub msg: serde_json::Value,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgExecuteContract {
    pub sender: String,
    pub contract: String,
    #[serde(default)]
    pub msg: serde_json::Value,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgMigrateContract {
    pub sender: String,
    pub contract: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub code_id: u64,
    #[serde(default)]
    pub msg: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgUpdateAdmin {
    pub sender: String,
    pub new_admin: String,
    pub contract: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgClearAdmin {
    pub sender: String,
    pub contract: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgIbcSend {
    pub channel: String,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub timeout_height: u64,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub timeout_timestamp: u64,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgIbcCloseChannel {
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgUpdateInstantiateConfig {
    pub sender: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub code_id: u64,
    #[serde(default)]
    pub new_instantiate_permission: Option<AccessConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_is_split_from_fields() {
        let raw = r#"{
            "@type": "/cosmwasm.wasm.v1.MsgExecuteContract",
            "sender": "wasm1sender",
            "contract": "wasm1contract",
            "msg": {"transfer": {"recipient": "wasm1to", "amount": "5"}},
            "funds": []
        }"#;
        let message: CosmosMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.kind(), Some(MessageKind::ExecuteContract));

        let execute: MsgExecuteContract = message.decode().unwrap();
        assert_eq!(execute.contract, "wasm1contract");
        assert!(message.body.get("@type").is_none());
    }

    #[test]
    fn every_kind_round_trips_its_type_url() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_type_url(kind.type_url()), Some(kind));
        }
        assert_eq!(MessageKind::from_type_url("/cosmos.bank.v1beta1.MsgSend"), None);
    }
}
