//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks that the gateway can serve a call

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does not check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when project credentials are configured and the static pages
/// directory exists, 503 otherwise. The video platform itself is not probed;
/// its availability is only known per request.
#[tracing::instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.config.api_key.is_empty() {
        tracing::warn!(target: "gw.health", "Readiness check failed: API key not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                public_dir: None,
                error: Some("Service credentials unavailable".to_string()),
            }),
        );
    }

    if !tokio::fs::metadata(&state.config.public_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
    {
        tracing::warn!(
            target: "gw.health",
            public_dir = %state.config.public_dir.display(),
            "Readiness check failed: public directory missing"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                public_dir: Some("missing"),
                error: Some("Static pages unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            public_dir: Some("present"),
            error: None,
        }),
    )
}
