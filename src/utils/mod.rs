pub mod address;
pub mod instrument;

use anyhow::{Context, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serializer};
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    // File settings first, then BE_RPC__* environment overrides
    let settings = config::Config::builder()
        .add_source(config::File::from(config_path))
        .add_source(config::Environment::with_prefix("BE_RPC").separator("__"))
        .build()
        .context("failed to read config file")?;

    let mut config: Config = settings
        .try_deserialize()
        .context("failed to parse config YAML")?;

    config.chain_name = config.chain_name.replace('-', "_");
    if config.balance_concurrency == 0 {
        config.balance_concurrency = 1;
    }

    Ok(config)
}

/// Uppercase hex, the form the node's tx service keys consensus transactions by.
pub fn upper_hex(bytes: &[u8]) -> String {
    alloy_primitives::hex::encode_upper(bytes)
}

/// Renders big integers as decimal text.
pub fn serialize_decimal<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn serialize_optional_decimal<S>(value: &Option<BigUint>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}

/// Accepts integers encoded either as JSON numbers or as decimal strings, as the
/// node's REST gateway renders 64-bit values as strings.
pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.is_empty() => Ok(0),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Upstream gateways occasionally answer with an HTML error page; keep only the
/// first line of text so error messages stay readable.
pub fn strip_html(error: &str) -> String {
    if error.contains("<!doctype html>") || error.contains("<html>") {
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Gas {
        #[serde(deserialize_with = "deserialize_u64")]
        used: u64,
    }

    #[test]
    fn u64_from_string_or_number() {
        let a: Gas = serde_json::from_str(r#"{"used":"21000"}"#).unwrap();
        let b: Gas = serde_json::from_str(r#"{"used":21000}"#).unwrap();
        assert_eq!(a.used, 21000);
        assert_eq!(b.used, 21000);
    }

    #[test]
    fn strip_html_keeps_first_text_line() {
        let page = "<!doctype html>\n<html>\n<body>\n502 Bad Gateway\n</body>\n</html>";
        assert_eq!(strip_html(page), "502 Bad Gateway");
        assert_eq!(strip_html("plain error"), "plain error");
    }
}
