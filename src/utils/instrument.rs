use anyhow::Result;
use opentelemetry::KeyValue;
use std::future::Future;
use std::time::Instant;
use tracing::warn;

use crate::metrics::Metrics;
use crate::utils::strip_html;

/// Runs one upstream call, recording request count, latency and errors. Calls are
/// made exactly once; failures are logged and handed back to the caller.
pub async fn instrumented<Fut, T>(metrics: Option<&Metrics>, method: &'static str, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();

    if let Some(metrics) = metrics {
        metrics.upstream_requests.add(
            1,
            &[
                KeyValue::new("chain", metrics.chain_name.clone()),
                KeyValue::new("method", method),
            ],
        );
    }

    let result = call.await;

    if let Some(metrics) = metrics {
        metrics.upstream_latency.record(
            start.elapsed().as_secs_f64(),
            &[
                KeyValue::new("chain", metrics.chain_name.clone()),
                KeyValue::new("method", method),
            ],
        );
        if result.is_err() {
            metrics.upstream_errors.add(
                1,
                &[
                    KeyValue::new("chain", metrics.chain_name.clone()),
                    KeyValue::new("method", method),
                ],
            );
        }
    }

    if let Err(e) = &result {
        warn!("Upstream call '{}' failed: {}", method, strip_html(&format!("{e:#}")));
    }

    result
}
