//! HTML page handlers.
//!
//! - `GET /` - landing page (`index.html`)
//! - `GET /session/{sessionId}` - call page (`call.html`)
//!
//! The call page reads the session id from its own URL, so the server does
//! not template anything into it. Both pages are markup only: the host that
//! embeds the session client binds to the element ids listed in
//! [`LANDING_ELEMENT_IDS`] and [`CALL_ELEMENT_IDS`].

use crate::errors::GatewayError;
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::response::Html;
use std::sync::Arc;
use tracing::instrument;

/// File served for `/`.
pub const LANDING_PAGE: &str = "index.html";

/// File served for `/session/{sessionId}`.
pub const CALL_PAGE: &str = "call.html";

/// Elements of the landing page driven by the preselection screen.
pub const LANDING_ELEMENT_IDS: &[&str] = &[
    "preview-publisher",
    "audio-source",
    "video-source",
    "user-name",
    "create-session",
    "session-id",
    "join-session",
];

/// Elements of the call page driven by the session controller.
pub const CALL_ELEMENT_IDS: &[&str] = &[
    "layout",
    "chat",
    "chat-messages",
    "chat-input",
    "toggle-audio",
    "toggle-video",
    "toggle-screen-share",
    "toggle-recording",
    "recording-indicator",
    "toggle-chat",
    "unread-count",
    "end-call",
];

/// Handler for GET /
#[instrument(skip_all, name = "gw.pages.landing")]
pub async fn landing_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, GatewayError> {
    serve_page(&state, LANDING_PAGE).await
}

/// Handler for GET /session/{sessionId}
#[instrument(skip_all, name = "gw.pages.call", fields(session_id = %session_id))]
pub async fn call_page(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Html<String>, GatewayError> {
    serve_page(&state, CALL_PAGE).await
}

async fn serve_page(state: &AppState, file: &str) -> Result<Html<String>, GatewayError> {
    let path = state.config.public_dir.join(file);
    tokio::fs::read_to_string(&path)
        .await
        .map(Html)
        .map_err(|e| {
            tracing::warn!(
                target: "gw.handlers.pages",
                path = %path.display(),
                error = %e,
                "Page not available"
            );
            GatewayError::NotFound(file.to_string())
        })
}
