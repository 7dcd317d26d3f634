//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time until response head
//! - `proxy_blocked_destinations_total` (counter): refusals by stage
//!   (`request`, `dial`, `redirect`)
//! - `proxy_redirects_followed_total` (counter)
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! deployments without the exporter pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_blocked(stage: &'static str) {
    counter!("proxy_blocked_destinations_total", "stage" => stage).increment(1);
}

pub fn record_redirect() {
    counter!("proxy_redirects_followed_total").increment(1);
}
