use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder, HistogramVec,
    IntCounterVec, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TOOL_CALLS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "grafana_bridge_tool_calls_total",
        "Total number of tool invocations by outcome.",
        &["tool", "outcome"],
        REGISTRY
    )
    .expect("tool call counter registers once");
    pub static ref TOOL_DURATION_SECONDS: HistogramVec = register_histogram_vec_with_registry!(
        "grafana_bridge_tool_duration_seconds",
        "Time spent executing a tool.",
        &["tool"],
        REGISTRY
    )
    .expect("tool duration histogram registers once");
}

/// Text exposition of every bridge metric.
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::Error::Backend(format!("encoding metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Backend(format!("metrics are not UTF-8: {}", e)))
}
