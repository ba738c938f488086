use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub chain_name: String,

    // API metrics
    pub api_requests: Counter<u64>,
    pub api_errors: Counter<u64>,

    // Upstream metrics
    pub upstream_requests: Counter<u64>,
    pub upstream_errors: Counter<u64>,
    pub upstream_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(chain_name: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("be_rpc_metrics");

        let api_requests = meter
            .u64_counter("be_rpc_api_requests")
            .with_description("Number of explorer API requests served")
            .build();

        let api_errors = meter
            .u64_counter("be_rpc_api_errors")
            .with_description("Number of explorer API requests answered with an error")
            .build();

        let upstream_requests = meter
            .u64_counter("be_rpc_upstream_requests")
            .with_description("Number of upstream node requests made")
            .build();

        let upstream_errors = meter
            .u64_counter("be_rpc_upstream_errors")
            .with_description("Number of upstream node errors encountered")
            .build();

        let upstream_latency = meter
            .f64_histogram("be_rpc_upstream_latency")
            .with_description("Upstream node request latency")
            .with_boundaries(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            chain_name,
            api_requests,
            api_errors,
            upstream_requests,
            upstream_errors,
            upstream_latency,
        })
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Only used for logging
        let access_url = if addr.ip().to_string() == "0.0.0.0" {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind metrics listener")?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
