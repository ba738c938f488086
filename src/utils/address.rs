use alloy_primitives::{hex, Address};
use bech32::{Bech32, Hrp};
use serde::Serialize;
use std::fmt;

use crate::models::common::ChainVariant;
use crate::models::errors::ApiError;

/// Byte length of an execution-layer account address.
pub const EVM_ADDRESS_LENGTH: usize = 20;
/// Byte length of a wasm contract address.
pub const CONTRACT_ADDRESS_LENGTH: usize = 32;

/// An address in the textual form used for deduplication and output. Only the
/// normalizer hands these out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decoded address bytes, tagged by the family they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBytes {
    Evm(Address),
    Contract([u8; CONTRACT_ADDRESS_LENGTH]),
}

#[derive(Debug, Clone)]
pub struct AddressNormalizer {
    variant: ChainVariant,
    account_hrp: Hrp,
}

impl AddressNormalizer {
    pub fn new(variant: ChainVariant, bech32_prefix: &str) -> Result<Self, ApiError> {
        let account_hrp = Hrp::parse(bech32_prefix).map_err(|e| {
            ApiError::invalid_argument(format!("invalid bech32 prefix {bech32_prefix}: {e}"))
        })?;
        Ok(Self {
            variant,
            account_hrp,
        })
    }

    pub fn variant(&self) -> ChainVariant {
        self.variant
    }

    pub fn bech32_prefix(&self) -> &str {
        self.account_hrp.as_str()
    }

    /// Decodes any accepted textual encoding. `0x`-prefixed input must be a 20-byte
    /// hex address; anything else must be bech32 under the account prefix and
    /// decode to either 20 or 32 bytes.
    pub fn decode(&self, input: &str) -> Result<AddressBytes, ApiError> {
        let input = input.trim();
        if input.starts_with("0x") || input.starts_with("0X") {
            let bytes = hex::decode(&input[2..])
                .map_err(|e| ApiError::invalid_argument(format!("invalid hex address {input}: {e}")))?;
            if bytes.len() != EVM_ADDRESS_LENGTH {
                return Err(ApiError::invalid_argument(format!(
                    "invalid hex address {input}: expected {EVM_ADDRESS_LENGTH} bytes, got {}",
                    bytes.len()
                )));
            }
            return Ok(AddressBytes::Evm(Address::from_slice(&bytes)));
        }

        let (hrp, bytes) = bech32::decode(input)
            .map_err(|e| ApiError::invalid_argument(format!("invalid bech32 address {input}: {e}")))?;
        if !hrp.as_str().eq_ignore_ascii_case(self.account_hrp.as_str()) {
            return Err(ApiError::invalid_argument(format!(
                "invalid bech32 address {input}: expected prefix {}, got {}",
                self.account_hrp,
                hrp
            )));
        }

        match bytes.len() {
            EVM_ADDRESS_LENGTH => Ok(AddressBytes::Evm(Address::from_slice(&bytes))),
            CONTRACT_ADDRESS_LENGTH => {
                let mut contract = [0u8; CONTRACT_ADDRESS_LENGTH];
                contract.copy_from_slice(&bytes);
                Ok(AddressBytes::Contract(contract))
            }
            other => Err(ApiError::invalid_argument(format!(
                "invalid bech32 address {input}: unexpected length {other}"
            ))),
        }
    }

    pub fn normalize(&self, input: &str) -> Result<CanonicalAddress, ApiError> {
        match self.decode(input)? {
            AddressBytes::Evm(address) => self.from_evm(address),
            AddressBytes::Contract(bytes) => self.encode_bech32(&bytes),
        }
    }

    /// Canonical form of an execution-layer address for the active chain variant.
    pub fn from_evm(&self, address: Address) -> Result<CanonicalAddress, ApiError> {
        match self.variant {
            ChainVariant::Evm => Ok(CanonicalAddress(hex::encode_prefixed(address))),
            ChainVariant::Cosmos => self.encode_bech32(address.as_slice()),
        }
    }

    /// Decodes input that must name an execution-layer account.
    pub fn to_evm(&self, input: &str) -> Result<Address, ApiError> {
        match self.decode(input)? {
            AddressBytes::Evm(address) => Ok(address),
            AddressBytes::Contract(_) => Err(ApiError::invalid_argument(format!(
                "{input} is not an {EVM_ADDRESS_LENGTH}-byte account address"
            ))),
        }
    }

    /// Whether `value` is, on its own, a well-formed bech32 account or contract
    /// address of this chain.
    pub fn is_account_address(&self, value: &str) -> bool {
        let expected_start = format!("{}1", self.account_hrp.as_str());
        if !value.to_ascii_lowercase().starts_with(&expected_start) {
            return false;
        }
        self.decode(value).is_ok()
    }

    fn encode_bech32(&self, bytes: &[u8]) -> Result<CanonicalAddress, ApiError> {
        bech32::encode::<Bech32>(self.account_hrp, bytes)
            .map(CanonicalAddress)
            .map_err(|e| ApiError::internal(format!("failed to encode bech32 address: {e}")))
    }
}
