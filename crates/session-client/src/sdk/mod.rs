//! Vendor SDK seam.
//!
//! The controller and preselection screen only talk to the real-time SDK
//! through these traits. Session and publisher notifications arrive as typed
//! events on broadcast channels instead of callbacks, so reaction logic can
//! be driven directly in tests through [`mock`].

pub mod mock;

use common::types::{ArchiveId, ConnectionId, SessionId, StreamId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Resolution requested for camera publishers and subscribers.
pub const DEFAULT_RESOLUTION: &str = "1280x720";

/// Error reported by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SdkError {
    /// Vendor error code, when the SDK provides one.
    pub code: Option<i32>,
    pub message: String,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Identifier of a local publisher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublisherId(String);

impl PublisherId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of video carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    Camera,
    Screen,
    Custom,
}

/// A remote stream announced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_id: StreamId,
    pub connection_id: ConnectionId,
    pub name: Option<String>,
    pub video_type: VideoType,
}

/// Outgoing signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub signal_type: String,
    pub data: String,
}

/// Signal delivered to this participant. Senders receive their own signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub signal_type: String,
    pub data: String,
    pub from: ConnectionId,
}

/// Session notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A participant started publishing.
    StreamCreated(StreamInfo),
    /// A participant stopped publishing. The SDK removes its element.
    StreamDestroyed(StreamId),
    ArchiveStarted { id: ArchiveId, name: String },
    ArchiveStopped { id: ArchiveId },
    SignalReceived(SignalEvent),
}

/// Publisher notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherEvent {
    /// Capture ended outside the page, e.g. the browser's "stop sharing" bar.
    MediaStopped { publisher_id: PublisherId },
}

/// Capture source of a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSourceKind {
    #[default]
    Camera,
    Screen,
}

/// Options for a new publisher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublisherOptions {
    /// Display name shown to other participants.
    pub name: Option<String>,
    pub resolution: Option<String>,
    pub video_source: VideoSourceKind,
}

impl PublisherOptions {
    /// Camera publisher for the call page.
    pub fn camera(name: Option<String>) -> Self {
        Self {
            name,
            resolution: Some(DEFAULT_RESOLUTION.to_string()),
            video_source: VideoSourceKind::Camera,
        }
    }

    /// Screen-share publisher.
    pub fn screen() -> Self {
        Self {
            name: None,
            resolution: None,
            video_source: VideoSourceKind::Screen,
        }
    }

    /// Local preview on the preselection screen.
    pub fn preview() -> Self {
        Self::default()
    }
}

/// Options for subscribing to a remote stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriberOptions {
    pub resolution: Option<String>,
}

/// A media input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: String,
    pub label: String,
    /// Raw kind as reported by the browser, e.g. `audioinput`.
    pub kind: String,
}

/// Screen-sharing support reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSharingCapability {
    pub supported: bool,
    /// `Some(false)` when the browser needs an extension that is not registered.
    pub extension_registered: Option<bool>,
    /// `Some(false)` when the needed extension is not installed.
    pub extension_installed: Option<bool>,
}

impl ScreenSharingCapability {
    pub fn supported() -> Self {
        Self {
            supported: true,
            extension_registered: None,
            extension_installed: None,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            extension_registered: None,
            extension_installed: None,
        }
    }
}

/// Current audio input of a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSourceState {
    pub device_id: Option<String>,
    pub enabled: bool,
}

/// Current video input of a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSourceState {
    pub device_id: Option<String>,
    /// Whether a video track is being sent.
    pub enabled: bool,
}

/// Entry point of the SDK.
#[async_trait::async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Create a session object. Nothing is sent until `connect`.
    fn init_session(
        &self,
        api_key: &str,
        session_id: &SessionId,
    ) -> Result<Arc<dyn SdkSession>, SdkError>;

    /// Start local capture.
    async fn init_publisher(
        &self,
        options: PublisherOptions,
    ) -> Result<Arc<dyn SdkPublisher>, SdkError>;

    /// Enumerate media input devices.
    async fn devices(&self) -> Result<Vec<Device>, SdkError>;

    async fn screen_sharing_capability(&self) -> ScreenSharingCapability;
}

/// A connection to one session.
#[async_trait::async_trait]
pub trait SdkSession: Send + Sync {
    /// Subscribe to session events. Only events sent after this call are seen.
    fn events(&self) -> broadcast::Receiver<SessionEvent>;

    async fn connect(&self, token: &str) -> Result<(), SdkError>;

    async fn publish(&self, publisher: &Arc<dyn SdkPublisher>) -> Result<(), SdkError>;

    async fn subscribe(
        &self,
        stream: &StreamInfo,
        options: SubscriberOptions,
    ) -> Result<(), SdkError>;

    /// Broadcast a signal to every participant, including this one.
    async fn signal(&self, signal: Signal) -> Result<(), SdkError>;

    /// This participant's connection, once connected.
    fn connection_id(&self) -> Option<ConnectionId>;

    async fn disconnect(&self);
}

/// Local capture handle.
#[async_trait::async_trait]
pub trait SdkPublisher: Send + Sync {
    fn id(&self) -> &PublisherId;

    fn events(&self) -> broadcast::Receiver<PublisherEvent>;

    fn publish_audio(&self, enabled: bool);

    fn publish_video(&self, enabled: bool);

    async fn set_audio_source(&self, device_id: &str) -> Result<(), SdkError>;

    async fn set_video_source(&self, device_id: &str) -> Result<(), SdkError>;

    fn audio_source(&self) -> AudioSourceState;

    fn video_source(&self) -> VideoSourceState;

    /// Stop capture and remove the publisher's element.
    fn destroy(&self);
}
