//! Metrics definitions for device authentication.
//!
//! All metrics follow Prometheus naming conventions:
//! - `device_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: `success` or one of the five failure category labels
//! - `status`: `success` or `error`

use crate::errors::FailureCategory;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("device_auth_jwks_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record the outcome of one `authenticate` call.
///
/// Metric: `device_auth_authentications_total`
/// Labels: `outcome`
pub fn record_authentication(failure: Option<FailureCategory>) {
    let outcome = failure.map_or("success", |category| category.as_str());

    counter!("device_auth_authentications_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one JWKS fetch attempt.
///
/// Metric: `device_auth_jwks_fetches_total`, `device_auth_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("device_auth_jwks_fetch_duration_seconds",
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("device_auth_jwks_fetches_total",
        "status" => status
    )
    .increment(1);
}
