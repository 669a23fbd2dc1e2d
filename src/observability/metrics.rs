//! Metrics collection and exposition.
//!
//! # Metrics
//! - `netgate_requests_total` (counter): gate outcomes by `outcome`
//! - `netgate_rejections_total` (counter): rejections by internal `kind`
//! - `netgate_policy_reloads_total` (counter): reload attempts by `result`
//! - `netgate_policy_version` (gauge): version of the active snapshot
//! - `netgate_active_counters` (gauge): live rate-limit counters after a sweep

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(outcome: &'static str) {
    ::metrics::counter!("netgate_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rejection(kind: &'static str) {
    ::metrics::counter!("netgate_rejections_total", "kind" => kind).increment(1);
}

pub fn record_policy_reload(result: &'static str, version: u64) {
    ::metrics::counter!("netgate_policy_reloads_total", "result" => result).increment(1);
    if result == "ok" {
        ::metrics::gauge!("netgate_policy_version").set(version as f64);
    }
}

pub fn record_active_counters(count: usize) {
    ::metrics::gauge!("netgate_active_counters").set(count as f64);
}
