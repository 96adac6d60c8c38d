use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const STORE_CALLS_TOTAL: &str = "reelhub_store_calls_total";
const STORE_CALL_DURATION_MS: &str = "reelhub_store_call_duration_ms";
const GRAPH_NODES_TOTAL: &str = "reelhub_graph_nodes_total";
const COMMENT_EVENTS_TOTAL: &str = "reelhub_comment_events_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn record_store_call(operation: &'static str, result: &'static str, duration_ms: f64) {
    counter!(
        STORE_CALLS_TOTAL,
        "operation" => operation,
        "result" => result
    )
    .increment(1);

    histogram!(
        STORE_CALL_DURATION_MS,
        "operation" => operation
    )
    .record(duration_ms.max(0.0));
}

pub fn record_graph_nodes(count: usize) {
    counter!(GRAPH_NODES_TOTAL).increment(count as u64);
}

pub fn record_comment_event(kind: &'static str) {
    counter!(COMMENT_EVENTS_TOTAL, "kind" => kind).increment(1);
}
