//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, errors, abuse decisions, cache)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `http_requests_total` (counter): every response leaving the proxy, by method, status
//! - `http_request_duration_seconds` (histogram): end-to-end latency by method
//! - `proxy_latency_seconds` (histogram): upstream exchange latency by backend
//! - `proxy_errors_total` (counter): upstream exchanges ending >= 400 or failing, by code
//! - `abuse_decisions_total` (counter): admit/reject decisions
//! - `abuse_bans_total` (counter): bans issued, by reason
//! - `cache_lookups_total` (counter): hit/miss
//! - `cache_evictions_total` (counter): LRU evictions
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder (tests) every call is a no-op
//! - Labels stay low-cardinality: no raw paths or client identities

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a response leaving the proxy.
pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record a completed upstream exchange.
pub fn record_upstream(backend: &str, status: u16, elapsed: Duration) {
    histogram!("proxy_latency_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
    if status >= 400 {
        counter!("proxy_errors_total", "code" => status.to_string()).increment(1);
    }
}

/// Record an upstream exchange that never produced a response.
pub fn record_upstream_failure(backend: &str, kind: &'static str, elapsed: Duration) {
    histogram!("proxy_latency_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
    counter!("proxy_errors_total", "code" => "502", "kind" => kind).increment(1);
}

pub fn record_abuse_decision(decision: &'static str) {
    counter!("abuse_decisions_total", "decision" => decision).increment(1);
}

pub fn record_ban(reason: &'static str) {
    counter!("abuse_bans_total", "reason" => reason).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction() {
    counter!("cache_evictions_total").increment(1);
}
