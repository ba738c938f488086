use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

use block_explorer_rpc::backend::rpc::consensus::CometConsensusClient;
use block_explorer_rpc::backend::rpc::execution::AlloyExecutionClient;
use block_explorer_rpc::backend::rpc::wasm::WasmRestClient;
use block_explorer_rpc::backend::rpc::ExecutionClient;
use block_explorer_rpc::backend::{select_backend, UpstreamClients};
use block_explorer_rpc::metrics::Metrics;
use block_explorer_rpc::models::common::Extension;
use block_explorer_rpc::server::{serve, ServerState};
use block_explorer_rpc::service::ExplorerService;
use block_explorer_rpc::utils::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config = match load_config("config.yml") {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(anyhow!(e));
        }
    };

    let extension: Extension = config.extension.parse()?;

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new(config.chain_name.clone())?))
    } else {
        info!("Metrics are disabled");
        None
    };

    if let Some(metrics_instance) = &metrics {
        metrics_instance
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
    }

    // Upstream clients
    let execution = match &config.execution_rpc_url {
        Some(url) => Some(Arc::new(AlloyExecutionClient::connect(url, metrics.clone())?) as Arc<dyn ExecutionClient>),
        None => None,
    };
    let clients = UpstreamClients {
        execution,
        consensus: Arc::new(CometConsensusClient::new(
            &config.consensus_rpc_url,
            &config.rest_api_url,
            metrics.clone(),
        )?),
        wasm: Arc::new(WasmRestClient::new(&config.rest_api_url, metrics.clone())?),
    };

    let backend = select_backend(extension, clients, &config.bech32_prefix, config.balance_concurrency).await?;
    let service = ExplorerService::new(backend, &config.bech32_prefix)?;

    println!();
    info!("========================= STARTING API SERVER =========================");

    serve(&config.listen_address, ServerState { service, metrics }).await?;

    info!("Shutdown complete");
    Ok(())
}
