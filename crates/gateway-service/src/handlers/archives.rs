//! Archive handlers.
//!
//! Thin proxies to the video platform. Nothing is remembered between calls;
//! the platform decides whether a start or stop is allowed.

use crate::errors::GatewayError;
use crate::models::{Archive, ArchiveList, ArchiveOptions, ARCHIVE_LIST_COUNT};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::Json;
use common::types::{ArchiveId, SessionId};
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for POST /api/archive/start/{sessionId}
///
/// Starts a composed recording named after the current local time.
#[instrument(skip_all, name = "gw.archive.start", fields(session_id = %session_id))]
pub async fn start_archive(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Archive>, GatewayError> {
    let options = ArchiveOptions::for_session_recording(chrono::Local::now());

    let archive = state
        .video_api
        .start_archive(&session_id, &options)
        .await
        .map_err(GatewayError::Upstream)?;

    info!(
        target: "gw.handlers.archives",
        session_id = %session_id,
        archive_id = %archive.id,
        "Archive started"
    );

    Ok(Json(archive))
}

/// Handler for POST /api/archive/{archiveId}/stop
#[instrument(skip_all, name = "gw.archive.stop", fields(archive_id = %archive_id))]
pub async fn stop_archive(
    State(state): State<Arc<AppState>>,
    Path(archive_id): Path<ArchiveId>,
) -> Result<Json<Archive>, GatewayError> {
    match state.video_api.stop_archive(&archive_id).await {
        Ok(archive) => {
            info!(target: "gw.handlers.archives", archive_id = %archive_id, "Archive stopped");
            Ok(Json(archive))
        }
        Err(source) => Err(GatewayError::ArchiveStop { archive_id, source }),
    }
}

/// Handler for GET /api/archive/list
///
/// Returns the ten most recent archives of the project.
#[instrument(skip_all, name = "gw.archive.list")]
pub async fn list_archives(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ArchiveList>, GatewayError> {
    let archives = state
        .video_api
        .list_archives(ARCHIVE_LIST_COUNT)
        .await
        .map_err(GatewayError::Upstream)?;

    Ok(Json(archives))
}
