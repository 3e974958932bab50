//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_connections_rejected_total` (counter): slot table full
//! - `proxy_active_connections` (gauge): occupied worker slots
//! - `proxy_bytes_relayed_total` (counter): by direction
//! - `proxy_tunnels_established_total` (counter): successful CONNECTs
//! - `proxy_worker_exits_total` (counter): by termination reason
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Prometheus endpoint is opt-in

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Direction of relayed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    counter!("proxy_connections_accepted_total").increment(1);
}

pub fn record_connection_rejected() {
    counter!("proxy_connections_rejected_total").increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_bytes_relayed(direction: Direction, bytes: usize) {
    counter!("proxy_bytes_relayed_total", "direction" => direction.as_str()).increment(bytes as u64);
}

pub fn record_tunnel_established() {
    counter!("proxy_tunnels_established_total").increment(1);
}

pub fn record_worker_exit(reason: &'static str) {
    counter!("proxy_worker_exits_total", "reason" => reason).increment(1);
}
