//! Prometheus metrics for the gateway
//!
//! Uses the `metrics` facade with the Prometheus exporter installed as the
//! global recorder. The rendered text format is served from the gateway's
//! own `/metrics` endpoint (allow-listed, pull-based) rather than a separate
//! listener, so the scrape path goes through the normal router.

use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::failsafe::CircuitState;
use crate::{Error, Result};

/// Install the Prometheus recorder and return the render handle.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Internal(format!("Failed to install metrics recorder: {e}")))
}

/// Record one completed request for a route.
///
/// `outcome` is one of `ok`, `no_route`, `fallback`, `error`.
pub fn request(route: &str, outcome: &'static str, latency: Duration) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string(),
    )
    .record(latency.as_secs_f64());
}

/// Record a circuit breaker state transition.
pub fn breaker_transition(route: &str, to: CircuitState) {
    counter!(
        "gateway_breaker_transitions_total",
        "route" => route.to_string(),
        "state" => to.as_str(),
    )
    .increment(1);
}

/// Record an outbound JWKS fetch. Cache hits are not counted.
pub fn jwks_fetch(forced: bool) {
    counter!(
        "gateway_jwks_fetches_total",
        "forced" => if forced { "true" } else { "false" },
    )
    .increment(1);
}
