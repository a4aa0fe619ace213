//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: the route templates below plus `/other`
//! - `status`: success, error, timeout
//! - `operation`: the four video platform operations

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Platform calls cross the internet; buckets reach further out.
        .set_buckets_for_metric(
            Matcher::Prefix("gw_video_api_request".to_string()),
            &[
                0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set video API buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Session and archive identifiers are replaced with placeholders.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" | "/api/create" | "/api/credentials"
        | "/api/archive/list" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    match parts.as_slice() {
        ["", "session", _] => "/session/{sessionId}".to_string(),
        ["", "api", "archive", "start", _] => "/api/archive/start/{sessionId}".to_string(),
        ["", "api", "archive", _, "stop"] => "/api/archive/{archiveId}/stop".to_string(),
        // Static assets and unknown paths share one label.
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Video Platform Metrics
// ============================================================================

/// Record a call to the video platform.
///
/// Metric: `gw_video_api_request_duration_seconds`, `gw_video_api_requests_total`
/// Labels: `operation`, `status`
///
/// Operations: "create_session", "start_archive", "stop_archive", "list_archives"
pub fn record_video_api_request(operation: &str, status: &str, duration: Duration) {
    histogram!("gw_video_api_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_video_api_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record a minted participant token.
///
/// Metric: `gw_tokens_issued_total`
/// Labels: `role`
pub fn record_token_issued(role: &str) {
    counter!("gw_tokens_issued_total",
        "role" => role.to_string()
    )
    .increment(1);
}
