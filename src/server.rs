use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use opentelemetry::KeyValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::models::errors::ApiError;
use crate::service::ExplorerService;

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
}

impl From<ApiError> for RpcErrorObject {
    fn from(err: ApiError) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_string(),
        }
    }
}

impl RpcErrorObject {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

type RpcResult = Result<Value, RpcErrorObject>;

pub struct ServerState {
    pub service: ExplorerService,
    pub metrics: Option<Arc<Metrics>>,
}

/// Positional parameter `index`, named `name` in error messages.
fn param<T: DeserializeOwned>(params: &Value, index: usize, name: &str) -> Result<T, RpcErrorObject> {
    let value = match params {
        Value::Array(values) => values.get(index).cloned(),
        Value::Null => None,
        _ => return Err(RpcErrorObject::new(INVALID_PARAMS, "params must be an array")),
    }
    .ok_or_else(|| RpcErrorObject::new(INVALID_PARAMS, format!("missing parameter {name}")))?;

    serde_json::from_value(value)
        .map_err(|e| RpcErrorObject::new(INVALID_PARAMS, format!("invalid parameter {name}: {e}")))
}

fn to_result<T: Serialize>(output: Result<T, ApiError>) -> RpcResult {
    let output = output?;
    serde_json::to_value(&output)
        .map_err(|e| ApiError::internal(format!("failed to encode response: {e}")).into())
}

/// Routes one call to the service.
pub async fn dispatch(service: &ExplorerService, method: &str, params: &Value) -> RpcResult {
    match method {
        "be_echo" => {
            let text: String = param(params, 0, "text")?;
            Ok(json!(format!(
                "hello \"{text}\" from {} Block Explorer API",
                service.backend_name()
            )))
        }
        "be_getTransactionByHash" => {
            let hash: String = param(params, 0, "hash")?;
            to_result(service.transaction_by_hash(&hash).await)
        }
        "be_getTransactionInvolversByHash" => {
            let hash: String = param(params, 0, "hash")?;
            to_result(service.transaction_involvers(&hash).await)
        }
        "be_getAccount" => {
            let address: String = param(params, 0, "address")?;
            to_result(service.account(&address).await)
        }
        "be_getModuleParams" => {
            let module: String = param(params, 0, "module")?;
            to_result(service.module_params(&module).await)
        }
        "be_getDenomsInformation" => to_result(service.denoms().await),
        "evm_getErc20ContractInfo" | "wasm_getErc20ContractInfo" => {
            let contract: String = param(params, 0, "contract")?;
            to_result(service.erc20_contract_info(&contract).await)
        }
        "evm_getErc20Balance" | "wasm_getErc20Balance" => {
            let account: String = param(params, 0, "account")?;
            let contracts: Vec<String> = param(params, 1, "contracts")?;
            to_result(service.erc20_balance(&account, &contracts).await)
        }
        "wasm_getCw20ContractInfo" => {
            let contract: String = param(params, 0, "contract")?;
            to_result(service.cw20_contract_info(&contract).await)
        }
        "wasm_getCw20Balance" => {
            let account: String = param(params, 0, "account")?;
            let contracts: Vec<String> = param(params, 1, "contracts")?;
            to_result(service.cw20_balance(&account, &contracts).await)
        }
        _ => Err(RpcErrorObject::new(METHOD_NOT_FOUND, format!("method {method} not found"))),
    }
}

fn envelope(id: Value, result: RpcResult) -> Value {
    match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
    }
}

async fn rpc_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Json<Value> {
    let request: RpcRequest = match serde_json::from_slice::<Value>(&body) {
        Err(e) => return Json(envelope(Value::Null, Err(RpcErrorObject::new(PARSE_ERROR, e.to_string())))),
        Ok(value) => match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Json(envelope(
                    Value::Null,
                    Err(RpcErrorObject::new(INVALID_REQUEST, e.to_string())),
                ));
            }
        },
    };

    debug!("API call {}", request.method);
    let result = dispatch(&state.service, &request.method, &request.params).await;

    if let Some(metrics) = &state.metrics {
        let attributes = [
            KeyValue::new("chain", metrics.chain_name.clone()),
            KeyValue::new("method", request.method.clone()),
        ];
        metrics.api_requests.add(1, &attributes);
        if result.is_err() {
            metrics.api_errors.add(1, &attributes);
        }
    }

    Json(envelope(request.id, result))
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().route("/", post(rpc_handler)).with_state(state)
}

/// Serves the API until Ctrl+C.
pub async fn serve(listen_address: &str, state: ServerState) -> Result<()> {
    let addr = listen_address
        .parse::<SocketAddr>()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind API listener")?;

    info!("Serving explorer API on {}", addr);
    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C signal, shutting down...");
            }
        })
        .await
        .context("API server failed")
}
