//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilient_requests_total` (counter): requests by service, outcome
//! - `resilient_retries_total` (counter): scheduled retries by service
//! - `resilient_fail_fast_total` (counter): circuit-open rejections
//! - `resilient_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilient_cache_events_total` (counter): hits/stale hits/misses
//! - `resilient_queue_depth` (gauge): current offline queue depth
//! - `resilient_ping_rtt_seconds` (histogram): liveness probe latency
//! - `resilient_network_online` (gauge): 1=online, 0=offline
//!
//! # Design Decisions
//! - Low-overhead updates through the `metrics` facade
//! - Exporter installation is optional and failure-tolerant

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter on `addr`. Failure is logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request_outcome(service: &str, outcome: &'static str) {
    counter!(
        "resilient_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(service: &str) {
    counter!("resilient_retries_total", "service" => service.to_string()).increment(1);
}

pub fn record_fail_fast(service: &str) {
    counter!("resilient_fail_fast_total", "service" => service.to_string()).increment(1);
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("resilient_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_cache_event(kind: &'static str) {
    counter!("resilient_cache_events_total", "kind" => kind).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("resilient_queue_depth").set(depth as f64);
}

pub fn record_ping_rtt(rtt: Duration) {
    histogram!("resilient_ping_rtt_seconds").record(rtt.as_secs_f64());
}

pub fn record_network_online(online: bool) {
    gauge!("resilient_network_online").set(if online { 1.0 } else { 0.0 });
}
