//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{TokenGenerator, VideoApi};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Video platform client.
    pub video_api: Arc<dyn VideoApi>,

    /// Participant token minting with the project credentials.
    pub token_generator: TokenGenerator,
}

impl AppState {
    /// Build state from configuration and a platform client.
    pub fn new(config: Config, video_api: Arc<dyn VideoApi>) -> Self {
        let token_generator = TokenGenerator::new(
            config.api_key.clone(),
            config.api_secret.clone(),
            config.token_ttl_seconds,
        );

        Self {
            config,
            video_api,
            token_generator,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/` and `/session/{sessionId}` - landing and call pages
/// - `/api/create`, `/api/credentials` - session creation and tokens
/// - `/api/archive/start/{sessionId}`, `/api/archive/{archiveId}/stop`,
///   `/api/archive/list` - archive proxies
/// - `/health`, `/ready`, `/metrics` - operational endpoints
/// - any other path served from the public directory
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);
    let static_files = ServeDir::new(&state.config.public_dir);

    let app_routes = Router::new()
        .route("/", get(handlers::landing_page))
        .route("/session/:session_id", get(handlers::call_page))
        .route("/api/create", post(handlers::create_session))
        .route("/api/credentials", post(handlers::issue_credentials))
        .route(
            "/api/archive/start/:session_id",
            post(handlers::start_archive),
        )
        .route("/api/archive/:archive_id/stop", post(handlers::stop_archive))
        .route("/api/archive/list", get(handlers::list_archives))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    app_routes
        .merge(metrics_routes)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
