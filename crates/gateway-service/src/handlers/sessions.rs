//! Session handlers.
//!
//! - `POST /api/create` - create a routed session on the video platform
//! - `POST /api/credentials` - mint a participant token for a session
//!
//! Credentials are signed locally. The session id is not checked against the
//! platform, so a token for a nonexistent session is issued and only fails
//! when the browser connects.

use crate::errors::GatewayError;
use crate::models::{CreateSessionResponse, CredentialsRequest, CredentialsResponse, SessionOptions};
use crate::observability::metrics;
use crate::routes::AppState;
use crate::services::token_generator::TokenError;
use crate::services::TokenOptions;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for POST /api/create
///
/// # Response
///
/// - 200 OK: `{"sessionId": "..."}`
/// - 500 Internal Server Error: `{"error": "createSession error"}`
#[instrument(skip_all, name = "gw.session.create")]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CreateSessionResponse>, GatewayError> {
    let session_id = state
        .video_api
        .create_session(SessionOptions::default())
        .await
        .map_err(GatewayError::SessionCreate)?;

    info!(target: "gw.handlers.sessions", session_id = %session_id, "Session created");

    Ok(Json(CreateSessionResponse { session_id }))
}

/// Handler for POST /api/credentials
///
/// # Response
///
/// - 200 OK: `{"sessionId", "apiKey", "token"}`
/// - 400 Bad Request: body is not `{"sessionId": "<non-empty>"}`
#[instrument(skip_all, name = "gw.session.credentials", fields(session_id = tracing::field::Empty))]
pub async fn issue_credentials(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<CredentialsResponse>, GatewayError> {
    // Parsed by hand so a malformed body is a 400 rather than axum's 422.
    let request: CredentialsRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "gw.handlers.sessions", error = %e, "Invalid request body");
        GatewayError::BadRequest("Invalid request body".to_string())
    })?;

    tracing::Span::current().record("session_id", request.session_id.as_str());

    let options = TokenOptions::default();
    let token = state
        .token_generator
        .generate(&request.session_id, &options, chrono::Utc::now().timestamp())
        .map_err(|e| match e {
            TokenError::EmptySessionId => {
                GatewayError::BadRequest("sessionId must not be empty".to_string())
            }
            other => {
                tracing::error!(target: "gw.handlers.sessions", error = %other, "Token generation failed");
                GatewayError::Internal
            }
        })?;

    metrics::record_token_issued(options.role.as_str());

    Ok(Json(CredentialsResponse {
        session_id: request.session_id,
        api_key: state.config.api_key.clone(),
        token,
    }))
}
