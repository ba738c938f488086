use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::utils::{serialize_decimal, serialize_optional_decimal};

/// Token metadata read from a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "totalSupply",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_decimal"
    )]
    pub total_supply: Option<BigUint>,
}

impl TokenDescriptor {
    /// Label shown next to a balance: symbol, else name, else the contract
    /// address in parentheses.
    pub fn display(&self, contract: &str) -> String {
        self.symbol
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("({contract})"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub contract: String,
    pub display: String,
    pub decimals: u8,
    #[serde(serialize_with = "serialize_decimal")]
    pub balance: BigUint,
}

impl TokenBalance {
    /// Record for an address with nothing deployed at it.
    pub fn empty(contract: String) -> Self {
        Self {
            contract,
            display: String::new(),
            decimals: 0,
            balance: BigUint::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Erc20Balances {
    pub account: String,
    pub erc20_balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cw20Balances {
    pub account: String,
    #[serde(rename = "cw20Balances")]
    pub cw20_balances: Vec<TokenBalance>,
}

/// Reply to the CW-20 `token_info` smart query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cw20TokenInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub total_supply: Option<String>,
}

/// Reply to the CW-20 `balance` smart query.
#[derive(Debug, Clone, Deserialize)]
pub struct Cw20BalanceResponse {
    pub balance: String,
}
