//! Per-tab session controller.
//!
//! `SessionController` owns everything the call page keeps between events:
//! the SDK session, the camera and screen publishers, the recording
//! indicator, the chat panel and the tile layout. It is driven by three
//! inputs, each handled by one method:
//!
//! - UI commands ([`ControllerCommand`]) via `handle_command`
//! - session events ([`SessionEvent`]) via `handle_session_event`
//! - screen publisher events ([`PublisherEvent`]) via `handle_publisher_event`
//!
//! Handlers return a [`FollowUp`] for work that must happen later (delayed
//! or debounced relayout, navigation after teardown). [`actor`] runs the
//! controller on a task and schedules those follow-ups.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> AwaitingCredentials -> Connecting -> Connected -> Terminated
//! ```
//!
//! A failure stops the controller in the state it reached. Nothing is retried.

pub mod actor;

use crate::chat::{ChatMessage, ChatPanel, ChatRelay, MessageOrigin, TEXT_SIGNAL_TYPE};
use crate::errors::ClientError;
use crate::gateway::GatewayApi;
use crate::layout::{LayoutEngine, Size, TilePlacement, TileSpec};
use crate::preferences::{DevicePreferencesRepository, PreferenceStore};
use crate::sdk::{
    PublisherEvent, PublisherOptions, SdkPublisher, SdkSession, SessionEvent, StreamInfo,
    SubscriberOptions, VideoPlatform, VideoType, DEFAULT_RESOLUTION,
};
use common::types::{ArchiveId, SessionId, StreamId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Delay before relayout after a stream leaves, so its element can animate out.
pub const STREAM_DESTROYED_RELAYOUT_DELAY: Duration = Duration::from_millis(200);

/// Delay between teardown and leaving the call page.
pub const TEARDOWN_DELAY: Duration = Duration::from_millis(200);

/// Path of the landing page.
pub const LANDING_PATH: &str = "/";

/// Session page URL for `session_id`, with the display name when given.
pub fn session_url(session_id: &SessionId, name: Option<&str>) -> String {
    let id = urlencoding::encode(session_id.as_str());
    match name {
        Some(name) => format!("/session/{id}?name={}", urlencoding::encode(name)),
        None => format!("/session/{id}"),
    }
}

/// Session id and display name parsed from the call page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub session_id: SessionId,
    pub name: Option<String>,
}

impl JoinParams {
    /// Parse `/session/<id>?name=<name>`, either as a path or a full URL.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the path has no session segment.
    pub fn from_url(url: &str) -> Result<Self, ClientError> {
        let without_fragment = url.split('#').next().unwrap_or_default();
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (without_fragment, None),
        };

        // Drop scheme and authority of absolute URLs.
        let path = match path.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("/", |i| rest.get(i..).unwrap_or("/")),
            None => path,
        };

        let session_id = path
            .split('/')
            .nth(2)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| ClientError::InvalidUrl(url.to_string()))?;

        let session_id = urlencoding::decode(session_id)
            .map_err(|_| ClientError::InvalidUrl(url.to_string()))?
            .into_owned();

        let name = query
            .and_then(|query| query_param(query, "name"))
            .filter(|name| !name.is_empty());

        Ok(Self {
            session_id: SessionId::new(session_id),
            name,
        })
    }

    /// URL to reload the page with the prompted display name appended.
    pub fn redirect_with_name(&self, name: &str) -> String {
        session_url(&self.session_id, Some(name))
    }
}

/// First value of `key` in a form-encoded query string.
fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k != key {
            return None;
        }
        let v = v.replace('+', " ");
        urlencoding::decode(&v).ok().map(|v| v.into_owned())
    })
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// No display name in the URL. Prompt for one and navigate to
    /// `JoinParams::redirect_with_name`.
    NeedsName { session_id: SessionId },
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    AwaitingCredentials,
    Connecting,
    Connected,
    Terminated,
}

/// UI inputs of the call page.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
    ToggleAudio,
    ToggleVideo,
    ToggleScreenShare,
    ToggleChat,
    SendChat(String),
    ToggleRecording,
    /// The window was resized to the given viewport.
    Resize(Size),
    EndCall,
}

/// Optional call page features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCapabilities {
    /// Show the record control.
    pub recording: bool,
}

impl Default for ControllerCapabilities {
    fn default() -> Self {
        Self { recording: true }
    }
}

/// Local view of the session's archive. The SDK's archive events are the
/// only thing that changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingIndicator {
    pub active: bool,
    pub archive_id: Option<ArchiveId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Landing,
}

impl Navigation {
    pub fn path(&self) -> &'static str {
        match self {
            Navigation::Landing => LANDING_PATH,
        }
    }
}

/// Work a handler leaves for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Relayout after `STREAM_DESTROYED_RELAYOUT_DELAY`.
    DelayedRelayout,
    /// Relayout once resizing settles.
    DebouncedRelayout,
    /// Navigate after `TEARDOWN_DELAY`.
    Navigate(Navigation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TileSource {
    Camera,
    Screen,
    Stream(StreamId),
}

#[derive(Debug, Clone)]
struct Tile {
    id: String,
    big: bool,
    source: TileSource,
}

/// Session controller for one browser tab.
pub struct SessionController {
    platform: Arc<dyn VideoPlatform>,
    gateway: Arc<dyn GatewayApi>,
    preferences: DevicePreferencesRepository<Arc<dyn PreferenceStore>>,
    capabilities: ControllerCapabilities,
    layout: LayoutEngine,
    state: ControllerState,
    session_id: Option<SessionId>,
    username: Option<String>,
    session: Option<Arc<dyn SdkSession>>,
    publisher: Option<Arc<dyn SdkPublisher>>,
    screen_publisher: Option<Arc<dyn SdkPublisher>>,
    sharing: bool,
    recording: RecordingIndicator,
    chat: ChatPanel,
    tiles: Vec<Tile>,
    viewport: Size,
    placements: Vec<TilePlacement>,
    session_events: Option<broadcast::Receiver<SessionEvent>>,
    screen_events: Option<broadcast::Receiver<PublisherEvent>>,
}

impl SessionController {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        gateway: Arc<dyn GatewayApi>,
        preferences: Arc<dyn PreferenceStore>,
        capabilities: ControllerCapabilities,
        viewport: Size,
    ) -> Self {
        Self {
            platform,
            gateway,
            preferences: DevicePreferencesRepository::new(preferences),
            capabilities,
            layout: LayoutEngine::default(),
            state: ControllerState::Uninitialized,
            session_id: None,
            username: None,
            session: None,
            publisher: None,
            screen_publisher: None,
            sharing: false,
            recording: RecordingIndicator::default(),
            chat: ChatPanel::new(),
            tiles: Vec::new(),
            viewport,
            placements: Vec::new(),
            session_events: None,
            screen_events: None,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn capabilities(&self) -> ControllerCapabilities {
        self.capabilities
    }

    pub fn recording(&self) -> &RecordingIndicator {
        &self.recording
    }

    pub fn chat(&self) -> &ChatPanel {
        &self.chat
    }

    pub fn is_sharing(&self) -> bool {
        self.sharing
    }

    /// Last computed tile geometry.
    pub fn placements(&self) -> &[TilePlacement] {
        &self.placements
    }

    /// Size of the layout container: the viewport minus the open chat panel.
    pub fn container(&self) -> Size {
        Size::new(
            (self.viewport.width * self.chat.layout_width_fraction()).floor(),
            self.viewport.height,
        )
    }

    /// Session events subscribed during `initialize`. Can be taken once.
    pub fn take_session_events(&mut self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.session_events.take()
    }

    /// Events of the current screen publisher. Can be taken once per share.
    pub fn take_screen_events(&mut self) -> Option<broadcast::Receiver<PublisherEvent>> {
        self.screen_events.take()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Join the session named by the page URL.
    ///
    /// Fetches credentials, creates the camera publisher with the saved
    /// device preferences, connects and publishes. Returns
    /// `JoinOutcome::NeedsName` without any network call when the URL has
    /// no display name.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` if called twice
    /// - `ClientError::InvalidUrl` if the URL has no session id
    /// - gateway and SDK errors, leaving the controller in the state reached
    #[instrument(skip_all, name = "client.controller.initialize")]
    pub async fn initialize(&mut self, url: &str) -> Result<JoinOutcome, ClientError> {
        self.expect_state(ControllerState::Uninitialized)?;

        let params = JoinParams::from_url(url)?;
        let Some(name) = params.name else {
            debug!(target: "client.controller", session_id = %params.session_id, "Display name missing");
            return Ok(JoinOutcome::NeedsName {
                session_id: params.session_id,
            });
        };
        self.session_id = Some(params.session_id.clone());
        self.username = Some(name.clone());

        self.state = ControllerState::AwaitingCredentials;
        let credentials = self.gateway.credentials(&params.session_id).await?;

        self.state = ControllerState::Connecting;
        let session = self
            .platform
            .init_session(&credentials.api_key, &credentials.session_id)?;
        self.session_events = Some(session.events());
        self.session = Some(session.clone());

        let publisher = self
            .platform
            .init_publisher(PublisherOptions::camera(Some(name)))
            .await?;
        self.apply_saved_preferences(publisher.as_ref()).await;
        self.tiles.push(Tile {
            id: publisher.id().to_string(),
            big: false,
            source: TileSource::Camera,
        });
        self.publisher = Some(publisher.clone());

        session.connect(&credentials.token).await?;
        session.publish(&publisher).await?;

        self.state = ControllerState::Connected;
        self.relayout();

        info!(
            target: "client.controller",
            session_id = %credentials.session_id,
            "Joined session"
        );
        Ok(JoinOutcome::Joined)
    }

    async fn apply_saved_preferences(&self, publisher: &dyn SdkPublisher) {
        let preferences = match self.preferences.load() {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!(target: "client.controller", error = %e, "Failed to load device preferences");
                return;
            }
        };
        if let Err(e) = preferences.apply_to(publisher).await {
            warn!(target: "client.controller", error = %e, "Failed to apply device preferences");
        }
    }

    /// Destroy publishers and disconnect. Safe to call more than once.
    pub async fn teardown(&mut self) {
        if let Some(screen) = self.screen_publisher.take() {
            screen.destroy();
        }
        if let Some(publisher) = self.publisher.take() {
            publisher.destroy();
        }
        if let Some(session) = self.session.take() {
            session.disconnect().await;
        }
        self.sharing = false;
        self.tiles.clear();
        self.placements.clear();
        self.session_events = None;
        self.screen_events = None;
        self.state = ControllerState::Terminated;
        debug!(target: "client.controller", "Session torn down");
    }

    /// Tear down, wait `TEARDOWN_DELAY`, then return where to navigate.
    pub async fn end_call(&mut self) -> Navigation {
        self.teardown().await;
        tokio::time::sleep(TEARDOWN_DELAY).await;
        Navigation::Landing
    }

    /// Recompute tile geometry for the current tiles and container.
    pub fn relayout(&mut self) -> &[TilePlacement] {
        let specs: Vec<TileSpec> = self
            .tiles
            .iter()
            .map(|tile| TileSpec::new(tile.id.clone(), tile.big))
            .collect();
        self.placements = self.layout.compute(self.container(), &specs);
        &self.placements
    }

    // ------------------------------------------------------------------------
    // SDK events
    // ------------------------------------------------------------------------

    /// React to a session event.
    pub async fn handle_session_event(&mut self, event: SessionEvent) -> FollowUp {
        match event {
            SessionEvent::StreamCreated(stream) => {
                self.on_stream_created(stream).await;
                FollowUp::None
            }
            SessionEvent::StreamDestroyed(stream_id) => {
                debug!(target: "client.controller", stream_id = %stream_id, "stream destroyed");
                self.tiles
                    .retain(|tile| tile.source != TileSource::Stream(stream_id.clone()));
                FollowUp::DelayedRelayout
            }
            SessionEvent::ArchiveStarted { id, name } => {
                info!(target: "client.controller", archive_id = %id, name = %name, "archive started");
                self.recording = RecordingIndicator {
                    active: true,
                    archive_id: Some(id),
                };
                FollowUp::None
            }
            SessionEvent::ArchiveStopped { id } => {
                info!(target: "client.controller", archive_id = %id, "archive stopped");
                self.recording = RecordingIndicator::default();
                FollowUp::None
            }
            SessionEvent::SignalReceived(signal) => {
                if signal.signal_type != TEXT_SIGNAL_TYPE {
                    debug!(target: "client.controller", signal_type = %signal.signal_type, "Ignoring signal");
                    return FollowUp::None;
                }
                match ChatMessage::from_signal(&signal) {
                    Ok(message) => {
                        let local = self.session.as_ref().and_then(|s| s.connection_id());
                        let origin = MessageOrigin::classify(&signal.from, local.as_ref());
                        self.chat.receive(message, origin);
                    }
                    Err(e) => {
                        warn!(target: "client.controller", error = %e, "Malformed chat message");
                    }
                }
                FollowUp::None
            }
        }
    }

    async fn on_stream_created(&mut self, stream: StreamInfo) {
        let Some(session) = self.session.clone() else {
            return;
        };

        let options = SubscriberOptions {
            resolution: Some(DEFAULT_RESOLUTION.to_string()),
        };
        match session.subscribe(&stream, options).await {
            Ok(()) => self.tiles.push(Tile {
                id: stream.stream_id.to_string(),
                big: stream.video_type == VideoType::Screen,
                source: TileSource::Stream(stream.stream_id.clone()),
            }),
            Err(e) => {
                warn!(
                    target: "client.controller",
                    stream_id = %stream.stream_id,
                    error = %e,
                    "Failed to subscribe"
                );
            }
        }
        self.relayout();
    }

    /// React to an event of the screen publisher.
    pub fn handle_publisher_event(&mut self, event: PublisherEvent) -> FollowUp {
        match event {
            PublisherEvent::MediaStopped { publisher_id } => {
                let is_screen = self
                    .screen_publisher
                    .as_ref()
                    .is_some_and(|p| p.id() == &publisher_id);
                if is_screen {
                    debug!(target: "client.controller", "Screen capture stopped by the browser");
                    self.stop_screen_share();
                }
                FollowUp::None
            }
        }
    }

    // ------------------------------------------------------------------------
    // UI commands
    // ------------------------------------------------------------------------

    /// Apply a UI command.
    ///
    /// # Errors
    ///
    /// Screen share and validation errors are meant to be shown as alerts
    /// (see `ClientError::is_alert`); the rest are logged by the caller.
    pub async fn handle_command(
        &mut self,
        command: ControllerCommand,
    ) -> Result<FollowUp, ClientError> {
        match command {
            ControllerCommand::ToggleAudio => {
                let publisher = self.require_publisher()?;
                let enabled = !publisher.audio_source().enabled;
                publisher.publish_audio(enabled);
                self.preferences.set_audio_enabled(enabled)?;
                Ok(FollowUp::None)
            }
            ControllerCommand::ToggleVideo => {
                let publisher = self.require_publisher()?;
                let enabled = !publisher.video_source().enabled;
                publisher.publish_video(enabled);
                self.preferences.set_video_enabled(enabled)?;
                Ok(FollowUp::None)
            }
            ControllerCommand::ToggleScreenShare => {
                if self.sharing {
                    self.stop_screen_share();
                } else {
                    self.start_screen_share().await?;
                }
                Ok(FollowUp::None)
            }
            ControllerCommand::ToggleChat => {
                self.chat.toggle();
                self.relayout();
                Ok(FollowUp::None)
            }
            ControllerCommand::SendChat(text) => {
                let session = self.require_session()?;
                let username = self.username.clone().unwrap_or_default();
                ChatRelay::send(session.as_ref(), &text, &username, chrono::Local::now()).await;
                Ok(FollowUp::None)
            }
            ControllerCommand::ToggleRecording => {
                self.toggle_recording().await?;
                Ok(FollowUp::None)
            }
            ControllerCommand::Resize(viewport) => {
                self.viewport = viewport;
                Ok(FollowUp::DebouncedRelayout)
            }
            ControllerCommand::EndCall => {
                self.teardown().await;
                Ok(FollowUp::Navigate(Navigation::Landing))
            }
        }
    }

    async fn start_screen_share(&mut self) -> Result<(), ClientError> {
        let session = self.require_session()?;

        let capability = self.platform.screen_sharing_capability().await;
        if !capability.supported || capability.extension_registered == Some(false) {
            return Err(ClientError::ScreenShareUnsupported);
        }
        if capability.extension_installed == Some(false) {
            return Err(ClientError::ScreenShareExtensionMissing);
        }
        if self.tiles.iter().any(|tile| tile.big) {
            return Err(ClientError::ScreenShareInProgress);
        }

        let screen = self
            .platform
            .init_publisher(PublisherOptions::screen())
            .await?;
        let events = screen.events();

        if let Err(e) = session.publish(&screen).await {
            screen.destroy();
            return Err(e.into());
        }

        self.tiles.push(Tile {
            id: screen.id().to_string(),
            big: true,
            source: TileSource::Screen,
        });
        self.screen_publisher = Some(screen);
        self.screen_events = Some(events);
        self.sharing = true;
        self.relayout();

        info!(target: "client.controller", "Screen share started");
        Ok(())
    }

    fn stop_screen_share(&mut self) {
        if let Some(screen) = self.screen_publisher.take() {
            screen.destroy();
        }
        self.tiles.retain(|tile| tile.source != TileSource::Screen);
        self.screen_events = None;
        self.sharing = false;
        self.relayout();
    }

    async fn toggle_recording(&mut self) -> Result<(), ClientError> {
        if !self.capabilities.recording {
            return Err(ClientError::RecordingDisabled);
        }
        let session_id = self
            .session_id
            .clone()
            .ok_or(ClientError::InvalidState {
                expected: ControllerState::Connected,
                actual: self.state,
            })?;

        if !self.recording.active {
            let archive = self.gateway.start_archive(&session_id).await?;
            debug!(target: "client.controller", archive_id = %archive.id, "Archive start requested");
        } else if let Some(archive_id) = self.recording.archive_id.clone() {
            self.gateway.stop_archive(&archive_id).await?;
            debug!(target: "client.controller", archive_id = %archive_id, "record stopped");
        }
        Ok(())
    }

    fn expect_state(&self, expected: ControllerState) -> Result<(), ClientError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn require_session(&self) -> Result<Arc<dyn SdkSession>, ClientError> {
        match (&self.session, self.state) {
            (Some(session), ControllerState::Connected) => Ok(session.clone()),
            _ => Err(ClientError::InvalidState {
                expected: ControllerState::Connected,
                actual: self.state,
            }),
        }
    }

    fn require_publisher(&self) -> Result<Arc<dyn SdkPublisher>, ClientError> {
        self.publisher.clone().ok_or(ClientError::InvalidState {
            expected: ControllerState::Connected,
            actual: self.state,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::preferences::{MemoryPreferenceStore, PreferenceKey};
    use crate::sdk::mock::{MockPlatform, MockPublisher, PublisherCall, LOCAL_CONNECTION_ID};
    use crate::sdk::{ScreenSharingCapability, Signal, SignalEvent};
    use common::types::ConnectionId;

    const URL: &str = "http://localhost:3000/session/1_MX4abc?name=Ada+Lovelace";

    struct Fixture {
        platform: Arc<MockPlatform>,
        gateway: Arc<MockGateway>,
        store: Arc<MemoryPreferenceStore>,
        controller: SessionController,
    }

    fn fixture_with(platform: MockPlatform, gateway: MockGateway) -> Fixture {
        let platform = Arc::new(platform);
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryPreferenceStore::new());
        let controller = SessionController::new(
            platform.clone(),
            gateway.clone(),
            store.clone(),
            ControllerCapabilities::default(),
            Size::new(1280.0, 720.0),
        );
        Fixture {
            platform,
            gateway,
            store,
            controller,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockPlatform::new(), MockGateway::accepting())
    }

    async fn joined() -> Fixture {
        let mut f = fixture();
        assert_eq!(f.controller.initialize(URL).await.unwrap(), JoinOutcome::Joined);
        f
    }

    fn camera(f: &Fixture) -> Arc<MockPublisher> {
        f.platform.publishers().first().cloned().unwrap()
    }

    fn remote_stream(id: &str, video_type: VideoType) -> SessionEvent {
        SessionEvent::StreamCreated(StreamInfo {
            stream_id: StreamId::new(id),
            connection_id: ConnectionId::new(format!("conn-{id}")),
            name: Some("Grace".to_string()),
            video_type,
        })
    }

    #[test]
    fn test_join_params_from_path() {
        let params = JoinParams::from_url("/session/1_MX4abc?name=bob").unwrap();
        assert_eq!(params.session_id.as_str(), "1_MX4abc");
        assert_eq!(params.name.as_deref(), Some("bob"));
    }

    #[test]
    fn test_join_params_decodes_name() {
        let params = JoinParams::from_url(URL).unwrap();
        assert_eq!(params.name.as_deref(), Some("Ada Lovelace"));

        let params = JoinParams::from_url("/session/s?x=1&name=J%C3%BCrgen#top").unwrap();
        assert_eq!(params.name.as_deref(), Some("Jürgen"));
    }

    #[test]
    fn test_join_params_without_name() {
        let params = JoinParams::from_url("/session/1_MX4abc").unwrap();
        assert_eq!(params.name, None);

        let params = JoinParams::from_url("/session/1_MX4abc?name=").unwrap();
        assert_eq!(params.name, None);
    }

    #[test]
    fn test_join_params_rejects_missing_session() {
        assert!(matches!(
            JoinParams::from_url("/session/"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            JoinParams::from_url("http://localhost:3000"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redirect_with_name() {
        let params = JoinParams::from_url("/session/1_MX4abc").unwrap();
        assert_eq!(
            params.redirect_with_name("Ada Lovelace"),
            "/session/1_MX4abc?name=Ada%20Lovelace"
        );
        let reparsed = JoinParams::from_url(&params.redirect_with_name("Ada Lovelace")).unwrap();
        assert_eq!(reparsed.name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_initialize_needs_name() {
        let mut f = fixture();
        let outcome = f.controller.initialize("/session/1_MX4abc").await.unwrap();

        assert_eq!(
            outcome,
            JoinOutcome::NeedsName {
                session_id: SessionId::from("1_MX4abc")
            }
        );
        assert_eq!(f.controller.state(), ControllerState::Uninitialized);
        assert_eq!(f.gateway.credential_calls(), 0);
    }

    #[tokio::test]
    async fn test_initialize_connects_and_publishes() {
        let f = joined().await;
        assert_eq!(f.controller.state(), ControllerState::Connected);

        let session = f.platform.last_session().unwrap();
        assert_eq!(session.api_key(), "46000001");
        assert_eq!(
            session.connected_token().unwrap(),
            MockGateway::token_for(&SessionId::from("1_MX4abc"))
        );

        let publisher = camera(&f);
        assert_eq!(session.published(), vec![publisher.id().clone()]);
        assert_eq!(publisher.options().name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(publisher.options().resolution.as_deref(), Some("1280x720"));
        assert_eq!(f.controller.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_reapplies_preferences() {
        let mut f = fixture();
        f.store
            .set(PreferenceKey::VideoSourceId.as_str(), "cam-2")
            .unwrap();
        f.store
            .set(PreferenceKey::AudioSourceId.as_str(), "mic-2")
            .unwrap();
        f.store
            .set(PreferenceKey::AudioEnabled.as_str(), "false")
            .unwrap();

        f.controller.initialize(URL).await.unwrap();

        let calls = camera(&f).calls();
        assert!(calls.contains(&PublisherCall::SetVideoSource("cam-2".to_string())));
        assert!(calls.contains(&PublisherCall::SetAudioSource("mic-2".to_string())));
        assert!(calls.contains(&PublisherCall::PublishAudio(false)));
        assert!(!calls.iter().any(|c| matches!(c, PublisherCall::PublishVideo(_))));
    }

    #[tokio::test]
    async fn test_join_stays_muted_when_saved_camera_is_gone() {
        let mut f = fixture_with(
            MockPlatform::new().failing_source_switch(),
            MockGateway::accepting(),
        );
        f.store
            .set(PreferenceKey::VideoSourceId.as_str(), "unplugged-cam")
            .unwrap();
        f.store
            .set(PreferenceKey::AudioEnabled.as_str(), "false")
            .unwrap();

        assert_eq!(f.controller.initialize(URL).await.unwrap(), JoinOutcome::Joined);

        assert!(!camera(&f).audio_source().enabled);
        assert_eq!(f.controller.state(), ControllerState::Connected);
    }

    #[tokio::test]
    async fn test_credential_failure_stalls() {
        let mut f = fixture_with(MockPlatform::new(), MockGateway::failing_credentials());
        let err = f.controller.initialize(URL).await.unwrap_err();

        assert!(matches!(err, ClientError::Gateway { status: 500, .. }));
        assert_eq!(f.controller.state(), ControllerState::AwaitingCredentials);
        assert!(f.platform.last_session().is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_stays_connecting() {
        let mut f = fixture_with(MockPlatform::new().failing_connect(), MockGateway::accepting());
        let err = f.controller.initialize(URL).await.unwrap_err();

        assert!(matches!(err, ClientError::Sdk(_)));
        assert_eq!(f.controller.state(), ControllerState::Connecting);
    }

    #[tokio::test]
    async fn test_initialize_twice_is_rejected() {
        let mut f = joined().await;
        let err = f.controller.initialize(URL).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_stream_created_subscribes_and_lays_out() {
        let mut f = joined().await;

        let follow_up = f
            .controller
            .handle_session_event(remote_stream("s1", VideoType::Camera))
            .await;

        assert_eq!(follow_up, FollowUp::None);
        assert_eq!(
            f.platform.last_session().unwrap().subscribed(),
            vec![StreamId::new("s1")]
        );
        assert_eq!(f.controller.placements().len(), 2);
    }

    #[tokio::test]
    async fn test_screen_stream_is_big() {
        let mut f = joined().await;
        f.controller
            .handle_session_event(remote_stream("screen-1", VideoType::Screen))
            .await;

        let big: Vec<_> = f.controller.placements().iter().filter(|p| p.big).collect();
        assert_eq!(big.len(), 1);
        assert_eq!(big.first().unwrap().id, "screen-1");
    }

    #[tokio::test]
    async fn test_failed_subscribe_adds_no_tile() {
        let mut f = joined().await;
        f.platform.last_session().unwrap().fail_subscribes();

        f.controller
            .handle_session_event(remote_stream("s1", VideoType::Camera))
            .await;
        assert_eq!(f.controller.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_destroyed_schedules_relayout() {
        let mut f = joined().await;
        f.controller
            .handle_session_event(remote_stream("s1", VideoType::Camera))
            .await;

        let follow_up = f
            .controller
            .handle_session_event(SessionEvent::StreamDestroyed(StreamId::new("s1")))
            .await;

        assert_eq!(follow_up, FollowUp::DelayedRelayout);
        // Geometry is untouched until the delayed relayout runs.
        assert_eq!(f.controller.placements().len(), 2);
        assert_eq!(f.controller.relayout().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_events_flip_indicator() {
        let mut f = joined().await;

        f.controller
            .handle_session_event(SessionEvent::ArchiveStarted {
                id: ArchiveId::from("arch-1"),
                name: "archive-1".to_string(),
            })
            .await;
        assert!(f.controller.recording().active);
        assert_eq!(
            f.controller.recording().archive_id,
            Some(ArchiveId::from("arch-1"))
        );

        f.controller
            .handle_session_event(SessionEvent::ArchiveStopped {
                id: ArchiveId::from("arch-1"),
            })
            .await;
        assert_eq!(f.controller.recording(), &RecordingIndicator::default());
    }

    #[tokio::test]
    async fn test_text_signal_origin() {
        let mut f = joined().await;
        let data = r#"{"data":"hi","timestamp":"3:04:05 PM","username":"bob"}"#;

        for from in [LOCAL_CONNECTION_ID, "connection-remote"] {
            f.controller
                .handle_session_event(SessionEvent::SignalReceived(SignalEvent {
                    signal_type: "text".to_string(),
                    data: data.to_string(),
                    from: ConnectionId::new(from),
                }))
                .await;
        }

        let origins: Vec<_> = f.controller.chat().entries().iter().map(|e| e.origin).collect();
        assert_eq!(origins, vec![MessageOrigin::Me, MessageOrigin::Other]);
        assert_eq!(f.controller.chat().unread(), 1);
    }

    #[tokio::test]
    async fn test_other_signals_and_malformed_chat_are_ignored() {
        let mut f = joined().await;

        for (signal_type, data) in [("cursor", "{}"), ("text", "not json")] {
            f.controller
                .handle_session_event(SessionEvent::SignalReceived(SignalEvent {
                    signal_type: signal_type.to_string(),
                    data: data.to_string(),
                    from: ConnectionId::new("connection-remote"),
                }))
                .await;
        }
        assert!(f.controller.chat().entries().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_audio_persists() {
        let mut f = joined().await;

        f.controller
            .handle_command(ControllerCommand::ToggleAudio)
            .await
            .unwrap();
        assert!(!camera(&f).audio_source().enabled);
        assert_eq!(
            f.store.get(PreferenceKey::AudioEnabled.as_str()).unwrap(),
            Some("false".to_string())
        );

        f.controller
            .handle_command(ControllerCommand::ToggleAudio)
            .await
            .unwrap();
        assert!(camera(&f).audio_source().enabled);
        assert_eq!(
            f.store.get(PreferenceKey::AudioEnabled.as_str()).unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn test_toggle_video_persists() {
        let mut f = joined().await;
        f.controller
            .handle_command(ControllerCommand::ToggleVideo)
            .await
            .unwrap();

        assert!(!camera(&f).video_source().enabled);
        assert_eq!(
            f.store.get(PreferenceKey::VideoEnabled.as_str()).unwrap(),
            Some("false".to_string())
        );
    }

    #[tokio::test]
    async fn test_screen_share_start_and_stop() {
        let mut f = joined().await;

        f.controller
            .handle_command(ControllerCommand::ToggleScreenShare)
            .await
            .unwrap();
        assert!(f.controller.is_sharing());
        let screen = f.platform.publishers().get(1).cloned().unwrap();
        assert_eq!(screen.options(), &PublisherOptions::screen());
        assert!(f.controller.placements().iter().any(|p| p.big));
        assert!(f.controller.take_screen_events().is_some());

        f.controller
            .handle_command(ControllerCommand::ToggleScreenShare)
            .await
            .unwrap();
        assert!(!f.controller.is_sharing());
        assert!(screen.is_destroyed());
        assert!(!f.controller.placements().iter().any(|p| p.big));
    }

    #[tokio::test]
    async fn test_media_stopped_ends_share() {
        let mut f = joined().await;
        f.controller
            .handle_command(ControllerCommand::ToggleScreenShare)
            .await
            .unwrap();
        let screen = f.platform.publishers().get(1).cloned().unwrap();

        f.controller.handle_publisher_event(PublisherEvent::MediaStopped {
            publisher_id: screen.id().clone(),
        });

        assert!(screen.is_destroyed());
        assert!(!f.controller.is_sharing());
        assert_eq!(f.controller.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_screen_share_rejected_while_big_tile_exists() {
        let mut f = joined().await;
        f.controller
            .handle_session_event(remote_stream("screen-1", VideoType::Screen))
            .await;
        let before = f.controller.placements().to_vec();

        let err = f
            .controller
            .handle_command(ControllerCommand::ToggleScreenShare)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ScreenShareInProgress));
        assert!(err.is_alert());
        assert_eq!(f.controller.placements(), before.as_slice());
        assert_eq!(f.platform.publishers().len(), 1);
    }

    #[tokio::test]
    async fn test_screen_share_capability_errors() {
        let cases = [
            (
                ScreenSharingCapability::unsupported(),
                "screen share not supported by browser",
            ),
            (
                ScreenSharingCapability {
                    supported: true,
                    extension_registered: Some(false),
                    extension_installed: None,
                },
                "screen share not supported by browser",
            ),
            (
                ScreenSharingCapability {
                    supported: true,
                    extension_registered: Some(true),
                    extension_installed: Some(false),
                },
                "install the extension",
            ),
        ];

        for (capability, message) in cases {
            let mut f = fixture_with(
                MockPlatform::new().with_capability(capability),
                MockGateway::accepting(),
            );
            f.controller.initialize(URL).await.unwrap();

            let err = f
                .controller
                .handle_command(ControllerCommand::ToggleScreenShare)
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), message);
            assert!(!f.controller.is_sharing());
        }
    }

    #[tokio::test]
    async fn test_toggle_recording_calls_gateway() {
        let mut f = joined().await;

        f.controller
            .handle_command(ControllerCommand::ToggleRecording)
            .await
            .unwrap();
        assert_eq!(f.gateway.started(), vec![SessionId::from("1_MX4abc")]);
        // The indicator waits for the SDK's archive event.
        assert!(!f.controller.recording().active);

        f.controller
            .handle_session_event(SessionEvent::ArchiveStarted {
                id: ArchiveId::from("archive-1"),
                name: "archive-1".to_string(),
            })
            .await;
        f.controller
            .handle_command(ControllerCommand::ToggleRecording)
            .await
            .unwrap();
        assert_eq!(f.gateway.stopped(), vec![ArchiveId::from("archive-1")]);
    }

    #[tokio::test]
    async fn test_recording_disabled() {
        let platform = Arc::new(MockPlatform::new());
        let gateway = Arc::new(MockGateway::accepting());
        let mut controller = SessionController::new(
            platform,
            gateway.clone(),
            Arc::new(MemoryPreferenceStore::new()),
            ControllerCapabilities { recording: false },
            Size::new(1280.0, 720.0),
        );
        controller.initialize(URL).await.unwrap();

        let err = controller
            .handle_command(ControllerCommand::ToggleRecording)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RecordingDisabled));
        assert!(gateway.started().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_chat_narrows_layout() {
        let mut f = joined().await;
        f.controller
            .handle_command(ControllerCommand::ToggleChat)
            .await
            .unwrap();

        assert!(f.controller.chat().is_visible());
        assert_eq!(f.controller.container().width, 960.0);
        let tile = f.controller.placements().first().unwrap();
        assert!(tile.left + tile.width <= 960.0);
    }

    #[tokio::test]
    async fn test_send_chat_signals() {
        let mut f = joined().await;
        f.controller
            .handle_command(ControllerCommand::SendChat("hi".to_string()))
            .await
            .unwrap();

        let signals: Vec<Signal> = f.platform.last_session().unwrap().signals();
        assert_eq!(signals.len(), 1);
        let message: ChatMessage =
            serde_json::from_str(&signals.first().unwrap().data).unwrap();
        assert_eq!(message.username, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_commands_before_connect_are_rejected() {
        let mut f = fixture();
        let err = f
            .controller
            .handle_command(ControllerCommand::SendChat("hi".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidState {
                expected: ControllerState::Connected,
                actual: ControllerState::Uninitialized
            }
        ));
    }

    #[tokio::test]
    async fn test_resize_is_debounced() {
        let mut f = joined().await;
        let follow_up = f
            .controller
            .handle_command(ControllerCommand::Resize(Size::new(800.0, 600.0)))
            .await
            .unwrap();

        assert_eq!(follow_up, FollowUp::DebouncedRelayout);
        assert_eq!(f.controller.placements().first().unwrap().width, 1280.0);
        f.controller.relayout();
        assert_eq!(f.controller.placements().first().unwrap().width, 800.0);
    }

    #[tokio::test]
    async fn test_end_call_tears_down() {
        let mut f = joined().await;
        f.controller
            .handle_command(ControllerCommand::ToggleScreenShare)
            .await
            .unwrap();

        let follow_up = f
            .controller
            .handle_command(ControllerCommand::EndCall)
            .await
            .unwrap();

        assert_eq!(follow_up, FollowUp::Navigate(Navigation::Landing));
        assert_eq!(f.controller.state(), ControllerState::Terminated);
        assert!(f.platform.publishers().iter().all(|p| p.is_destroyed()));
        assert!(f.platform.last_session().unwrap().is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_waits_before_navigation() {
        let mut f = joined().await;
        let start = tokio::time::Instant::now();

        let navigation = f.controller.end_call().await;

        assert_eq!(navigation.path(), "/");
        assert!(start.elapsed() >= TEARDOWN_DELAY);
    }
}
