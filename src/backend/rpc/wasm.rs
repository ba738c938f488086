use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::sync::Arc;

use crate::backend::rpc::consensus::base_url;
use crate::backend::rpc::{send_json, WasmQueryClient};
use crate::metrics::Metrics;
use crate::utils::instrument::instrumented;

/// Header the SDK gateway reads to answer a query at a past height.
pub const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

/// Wasm state queries over the SDK REST gateway.
pub struct WasmRestClient {
    http: reqwest::Client,
    rest_url: String,
    metrics: Option<Arc<Metrics>>,
}

impl WasmRestClient {
    pub fn new(rest_url: &str, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            rest_url: base_url(rest_url, "REST API")?,
            metrics,
        })
    }
}

#[async_trait]
impl WasmQueryClient for WasmRestClient {
    async fn contract_code_id(&self, contract: &str) -> Result<u64> {
        instrumented(self.metrics.as_deref(), "wasm_contract_info", async {
            let request = self
                .http
                .get(format!("{}/cosmwasm/wasm/v1/contract/{}", self.rest_url, contract));

            let body = match send_json(request).await {
                Ok(Some(body)) => body,
                Ok(None) => return Ok(0),
                Err(e) if format!("{e:#}").contains("no such contract") => return Ok(0),
                Err(e) => return Err(e.context(format!("failed to get contract info of {contract}"))),
            };

            let code_id = match body.pointer("/contract_info/code_id") {
                Some(Value::String(s)) => s.parse().context("invalid code_id")?,
                Some(Value::Number(n)) => n.as_u64().ok_or_else(|| anyhow!("invalid code_id"))?,
                _ => 0,
            };
            Ok(code_id)
        })
        .await
    }

    async fn smart_contract_state(&self, contract: &str, query: &Value, height: Option<u64>) -> Result<Vec<u8>> {
        instrumented(self.metrics.as_deref(), "wasm_smart_query", async {
            let encoded = STANDARD.encode(serde_json::to_vec(query).context("failed to encode query")?);
            let mut request = self.http.get(format!(
                "{}/cosmwasm/wasm/v1/contract/{}/smart/{}",
                self.rest_url, contract, encoded
            ));
            if let Some(height) = height.filter(|h| *h > 0) {
                request = request.header(BLOCK_HEIGHT_HEADER, height.to_string());
            }

            let body = send_json(request)
                .await
                .with_context(|| format!("smart query on {contract}"))?
                .ok_or_else(|| anyhow!("no such contract: {contract}"))?;

            match body.get("data") {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(data) => serde_json::to_vec(data).context("failed to encode contract reply"),
            }
        })
        .await
    }
}
