//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): dispatch latency
//! - `http_active_connections` (gauge): live connection actors
//! - `http_parse_failures_total` (counter): messages rejected by the parser
//! - `http_auth_failures_total` (counter): security rejections by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ErrorCondition;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(address: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(address).install() {
        Ok(()) => tracing::info!(address = %address, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!("http_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("http_active_connections").decrement(1.0);
}

pub fn record_parse_failure() {
    metrics::counter!("http_parse_failures_total").increment(1);
}

pub fn record_auth_failure(condition: &ErrorCondition) {
    let kind = match condition {
        ErrorCondition::Unauthorized { .. } => "unauthorized",
        ErrorCondition::UnauthorizedStale { .. } => "stale",
        ErrorCondition::Forbidden => "forbidden",
        _ => "other",
    };
    metrics::counter!("http_auth_failures_total", "kind" => kind).increment(1);
}
