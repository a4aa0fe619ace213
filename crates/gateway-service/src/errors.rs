//! Gateway error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Upstream
//! failures always surface as 500 with a best-effort JSON body; the body
//! shape depends on which operation failed so browsers see what the call
//! page has always received.

use crate::services::video_api::VideoApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::types::ArchiveId;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Body returned when session creation fails upstream.
pub const CREATE_SESSION_ERROR: &str = "createSession error";

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - SessionCreate, Upstream, ArchiveStop, Internal: 500 Internal Server Error
/// - BadRequest: 400 Bad Request
/// - NotFound: 404 Not Found
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The platform refused or failed to create a session.
    #[error("Session creation failed upstream: {0}")]
    SessionCreate(#[source] VideoApiError),

    /// Any other platform call failed. The upstream error is passed through.
    #[error("Upstream error: {0}")]
    Upstream(#[source] VideoApiError),

    /// Stopping an archive failed upstream.
    #[error("Failed to stop archive {archive_id}: {source}")]
    ArchiveStop {
        archive_id: ArchiveId,
        #[source]
        source: VideoApiError,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::SessionCreate(_)
            | GatewayError::Upstream(_)
            | GatewayError::ArchiveStop { .. }
            | GatewayError::Internal => 500,
            GatewayError::BadRequest(_) => 400,
            GatewayError::NotFound(_) => 404,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

fn detailed(status: StatusCode, code: &str, message: String) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message,
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::SessionCreate(err) => {
                tracing::error!(target: "gw.upstream", error = %err, "createSession failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": CREATE_SESSION_ERROR })),
                )
                    .into_response()
            }
            GatewayError::Upstream(err) => {
                tracing::error!(target: "gw.upstream", error = %err, "Video platform call failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(err.error_body())).into_response()
            }
            GatewayError::ArchiveStop { archive_id, source } => {
                tracing::error!(
                    target: "gw.upstream",
                    archive_id = %archive_id,
                    error = %source,
                    "stopArchive failed"
                );
                let body: Value = json!({
                    "archiveId": archive_id,
                    "error": source.error_body(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            GatewayError::BadRequest(reason) => {
                detailed(StatusCode::BAD_REQUEST, "BAD_REQUEST", reason)
            }
            GatewayError::NotFound(resource) => {
                detailed(StatusCode::NOT_FOUND, "NOT_FOUND", resource)
            }
            GatewayError::Internal => detailed(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        }
    }
}
