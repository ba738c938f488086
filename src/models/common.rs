use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::errors::ConfigError;

pub type GenericResponse = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain_name: String,
    pub extension: String,
    pub bech32_prefix: String,
    pub execution_rpc_url: Option<String>,
    pub consensus_rpc_url: String,
    pub rest_api_url: String,
    pub listen_address: String,
    #[serde(default = "default_balance_concurrency")]
    pub balance_concurrency: usize,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_balance_concurrency() -> usize {
    4
}

/// Which chain-specific extension serves the explorer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    None,
    Evm,
    Wasm,
    // Probe the node for the modules it runs
    Auto,
}

impl FromStr for Extension {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "evm" => Ok(Self::Evm),
            "wasm" | "cosmwasm" => Ok(Self::Wasm),
            "auto" => Ok(Self::Auto),
            other => Err(ConfigError::UnsupportedExtension {
                extension: other.to_string(),
            }),
        }
    }
}

/// The address family whose textual encoding is canonical for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVariant {
    /// `0x`-prefixed lowercase hex.
    Evm,
    /// Bech32 with the chain's account prefix.
    Cosmos,
}
