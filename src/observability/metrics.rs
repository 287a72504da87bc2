//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): requests by kind (local, http, tunnel)
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_request_errors_total` (counter): per-connection failures by error
//! - `proxy_upstream_connect_failures_total` (counter): failed dials by kind
//! - `proxy_bytes_total` (counter): relayed bytes by direction

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::proxy::relay::RelayStats;
use crate::proxy::RequestKind;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(kind: RequestKind) {
    counter!("proxy_connections_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("proxy_request_errors_total", "error" => kind).increment(1);
}

pub fn record_upstream_failure(kind: RequestKind) {
    counter!("proxy_upstream_connect_failures_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_relay(stats: &RelayStats) {
    counter!("proxy_bytes_total", "direction" => "client_to_upstream")
        .increment(stats.client_to_upstream);
    counter!("proxy_bytes_total", "direction" => "upstream_to_client")
        .increment(stats.upstream_to_client);
}

pub fn connection_opened() {
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}
