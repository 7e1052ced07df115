//! Prometheus metrics exporter and request/error recorders.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Installs the global Prometheus recorder and returns a handle whose
/// `render()` backs the `/metrics` endpoint.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process")
}

pub fn record_request(route: &str) {
    metrics::counter!("http_requests_total", "route" => route.to_string()).increment(1);
}

pub fn record_error(route: &str, code: &str) {
    metrics::counter!("http_errors_total", "route" => route.to_string(), "code" => code.to_string()).increment(1);
}

pub fn record_query_latency(duration: Duration, degraded: bool) {
    metrics::histogram!("query_latency_seconds", "degraded" => degraded.to_string()).record(duration.as_secs_f64());
}

pub fn record_ws_connections(delta: i64) {
    if delta >= 0 {
        metrics::gauge!("websocket_connections").increment(delta as f64);
    } else {
        metrics::gauge!("websocket_connections").decrement((-delta) as f64);
    }
}
