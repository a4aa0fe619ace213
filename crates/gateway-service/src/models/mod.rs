//! Gateway models.
//!
//! Request/response bodies for the HTTP API and the archive types exchanged
//! with the video platform. JSON field names are camelCase to match what the
//! browser client and the platform expect.

use chrono::{DateTime, TimeZone};
use common::types::{ArchiveId, SessionId};
use serde::{Deserialize, Serialize};

/// Number of archives returned by the list endpoint.
pub const ARCHIVE_LIST_COUNT: u32 = 10;

// ============================================================================
// Session & Credential Models
// ============================================================================

/// How media flows between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaMode {
    /// Media is routed through the platform's media servers (required for archiving).
    #[default]
    Routed,
    /// Media flows peer-to-peer where possible.
    Relayed,
}

impl MediaMode {
    /// Value of the `p2p.preference` form field for this mode.
    pub fn p2p_preference(&self) -> &'static str {
        match self {
            MediaMode::Routed => "disabled",
            MediaMode::Relayed => "enabled",
        }
    }
}

/// Whether sessions are archived automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Archives are started explicitly through the archive endpoints.
    #[default]
    Manual,
    /// The platform starts an archive as soon as a client publishes.
    Always,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::Manual => "manual",
            ArchiveMode::Always => "always",
        }
    }
}

/// Options for creating a session upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub media_mode: MediaMode,
    pub archive_mode: ArchiveMode,
}

/// Response body for `POST /api/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

/// Request body for `POST /api/credentials`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub session_id: SessionId,
}

/// Response body for `POST /api/credentials`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsResponse {
    pub session_id: SessionId,
    pub api_key: String,
    pub token: String,
}

impl std::fmt::Debug for CredentialsResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsResponse")
            .field("session_id", &self.session_id)
            .field("api_key", &self.api_key)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Archive Models
// ============================================================================

/// How an archive records its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputMode {
    /// All streams composed into a single file.
    Composed,
    /// One file per stream.
    Individual,
}

/// Layout of a composed archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutType {
    BestFit,
    Pip,
    VerticalPresentation,
    HorizontalPresentation,
    Custom,
}

/// Layout applied to the best-fit layout while a screen is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenshareType {
    BestFit,
    Pip,
    VerticalPresentation,
    HorizontalPresentation,
}

/// Archive layout options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveLayout {
    #[serde(rename = "type")]
    pub layout_type: LayoutType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshare_type: Option<ScreenshareType>,
}

/// Options sent upstream when starting an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOptions {
    pub name: String,
    pub output_mode: OutputMode,
    pub layout: ArchiveLayout,
}

impl ArchiveOptions {
    /// Options used for session recordings started from the call page.
    ///
    /// The archive is named after the current local time, composed into a
    /// single file with a best-fit layout that switches to picture-in-picture
    /// while someone shares their screen.
    pub fn for_session_recording<Tz>(now: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            name: format!("archive-{}", now.format("%-m/%-d/%Y, %-I:%M:%S %p")),
            output_mode: OutputMode::Composed,
            layout: ArchiveLayout {
                layout_type: LayoutType::BestFit,
                screenshare_type: Some(ScreenshareType::Pip),
            },
        }
    }
}

/// Upstream request body for starting an archive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartArchiveRequest<'a> {
    pub session_id: &'a SessionId,
    #[serde(flatten)]
    pub options: &'a ArchiveOptions,
}

/// Archive lifecycle status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Started,
    Paused,
    Stopped,
    Uploaded,
    Available,
    Expired,
    Failed,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// Archive metadata returned by the platform.
///
/// Known fields are typed; anything else the platform sends is kept in
/// `extra` so responses pass through to the browser unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub id: ArchiveId,

    pub status: ArchiveStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub created_at: i64,

    /// Duration in seconds (0 while recording).
    #[serde(default)]
    pub duration: u64,

    /// Size in bytes (0 while recording).
    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mode: Option<OutputMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Archive listing returned by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveList {
    /// Total number of archives in the project (not just this page).
    pub count: u64,

    pub items: Vec<Archive>,
}

// ============================================================================
// Operational Models
// ============================================================================

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// Whether the static pages directory is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_dir: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
