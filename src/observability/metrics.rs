//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): plain-path requests by method, status
//! - `proxy_request_duration_seconds` (histogram): plain-path latency
//! - `proxy_upgrades_total` (counter): upgrade relays by outcome
//! - `proxy_splice_bytes_total` (counter): spliced bytes by direction
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - The Prometheus exporter is installed once at startup, from config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(error) => tracing::error!(error = %error, "Failed to install metrics exporter"),
    }
}

/// Record one plain-path request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record the outcome of one upgrade relay.
pub fn record_upgrade(outcome: &'static str) {
    counter!("proxy_upgrades_total", "outcome" => outcome).increment(1);
}

/// Record bytes moved by a finished splice.
pub fn record_splice(to_upstream: u64, to_client: u64) {
    counter!("proxy_splice_bytes_total", "direction" => "client_to_upstream")
        .increment(to_upstream);
    counter!("proxy_splice_bytes_total", "direction" => "upstream_to_client")
        .increment(to_client);
}
