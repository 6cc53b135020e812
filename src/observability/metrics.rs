//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_rate_limit_decisions_total` (counter): checks by scope, outcome
//! - `shield_rate_limit_fallback_total` (counter): answers served locally
//!   because the shared store failed
//! - `shield_egress_violations_total` (counter): refused fetches by kind
//! - `shield_content_violations_total` (counter): rejected documents by kind
//! - `shield_html_sanitized_total` (counter): HTML bodies rebuilt

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::policy::ViolationKind;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("shield_rate_limit_decisions_total", "Rate limit checks by scope and outcome");
    describe_counter!("shield_rate_limit_fallback_total", "Rate limit checks answered by the local fallback");
    describe_counter!("shield_egress_violations_total", "Outbound fetches refused, by violation kind");
    describe_counter!("shield_content_violations_total", "Documents rejected, by violation kind");
    describe_counter!("shield_html_sanitized_total", "HTML bodies rebuilt by the sanitizer");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_rate_limit_decision(scope: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("shield_rate_limit_decisions_total", "scope" => scope.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_rate_limit_fallback(backend: &'static str) {
    counter!("shield_rate_limit_fallback_total", "primary" => backend).increment(1);
}

pub fn record_egress_violation(kind: ViolationKind) {
    counter!("shield_egress_violations_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_content_violation(kind: ViolationKind) {
    counter!("shield_content_violations_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_html_sanitized() {
    counter!("shield_html_sanitized_total").increment(1);
}
