//! In-memory SDK for tests.
//!
//! `MockPlatform` hands out `MockSession`s and `MockPublisher`s that record
//! every call. Tests inject session and publisher events with `emit`.

use super::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Capacity of the mock event channels.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection id a mock session gets on connect, unless overridden.
pub const LOCAL_CONNECTION_ID: &str = "connection-local";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock entry point.
pub struct MockPlatform {
    devices: Mutex<Option<Vec<Device>>>,
    capability: Mutex<ScreenSharingCapability>,
    fail_connect: AtomicBool,
    fail_source_switch: AtomicBool,
    connection_id: Mutex<String>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    publishers: Mutex<Vec<Arc<MockPublisher>>>,
    next_publisher: AtomicUsize,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A platform with one microphone, one camera and screen sharing.
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Some(vec![
                Device {
                    device_id: "mic-1".to_string(),
                    label: "Built-in Microphone".to_string(),
                    kind: "audioinput".to_string(),
                },
                Device {
                    device_id: "cam-1".to_string(),
                    label: "FaceTime HD Camera".to_string(),
                    kind: "videoinput".to_string(),
                },
            ])),
            capability: Mutex::new(ScreenSharingCapability::supported()),
            fail_connect: AtomicBool::new(false),
            fail_source_switch: AtomicBool::new(false),
            connection_id: Mutex::new(LOCAL_CONNECTION_ID.to_string()),
            sessions: Mutex::new(Vec::new()),
            publishers: Mutex::new(Vec::new()),
            next_publisher: AtomicUsize::new(0),
        }
    }

    /// Replace the enumerated devices.
    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        *lock(&self.devices) = Some(devices);
        self
    }

    /// Device enumeration fails, as in browsers without media device access.
    pub fn without_device_access(self) -> Self {
        *lock(&self.devices) = None;
        self
    }

    pub fn with_capability(self, capability: ScreenSharingCapability) -> Self {
        *lock(&self.capability) = capability;
        self
    }

    /// Sessions fail to connect.
    pub fn failing_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Publishers created from now on fail to switch audio or video source,
    /// as when the chosen device has been unplugged.
    pub fn failing_source_switch(self) -> Self {
        self.fail_source_switch.store(true, Ordering::SeqCst);
        self
    }

    /// Connection id of sessions created from now on. Lets tests tell
    /// several participants apart.
    pub fn with_connection_id(self, connection_id: &str) -> Self {
        *lock(&self.connection_id) = connection_id.to_string();
        self
    }

    /// The most recently created session.
    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        lock(&self.sessions).last().cloned()
    }

    /// All publishers created so far, oldest first.
    pub fn publishers(&self) -> Vec<Arc<MockPublisher>> {
        lock(&self.publishers).clone()
    }
}

#[async_trait::async_trait]
impl VideoPlatform for MockPlatform {
    fn init_session(
        &self,
        api_key: &str,
        session_id: &SessionId,
    ) -> Result<Arc<dyn SdkSession>, SdkError> {
        let session = Arc::new(MockSession::new(
            api_key,
            session_id.clone(),
            ConnectionId::new(lock(&self.connection_id).clone()),
            self.fail_connect.load(Ordering::SeqCst),
        ));
        lock(&self.sessions).push(session.clone());
        Ok(session)
    }

    async fn init_publisher(
        &self,
        options: PublisherOptions,
    ) -> Result<Arc<dyn SdkPublisher>, SdkError> {
        let n = self.next_publisher.fetch_add(1, Ordering::SeqCst) + 1;
        let publisher = Arc::new(MockPublisher::new(
            PublisherId::new(format!("publisher-{n}")),
            options,
            self.fail_source_switch.load(Ordering::SeqCst),
        ));
        lock(&self.publishers).push(publisher.clone());
        Ok(publisher)
    }

    async fn devices(&self) -> Result<Vec<Device>, SdkError> {
        lock(&self.devices)
            .clone()
            .ok_or_else(|| SdkError::with_code(1004, "getUserMedia not available"))
    }

    async fn screen_sharing_capability(&self) -> ScreenSharingCapability {
        *lock(&self.capability)
    }
}

/// Recording mock session.
pub struct MockSession {
    api_key: String,
    session_id: SessionId,
    connection_id: ConnectionId,
    fail_connect: bool,
    fail_signal: AtomicBool,
    fail_subscribe: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
    connected_token: Mutex<Option<String>>,
    published: Mutex<Vec<PublisherId>>,
    subscribed: Mutex<Vec<StreamId>>,
    signals: Mutex<Vec<Signal>>,
    disconnected: AtomicBool,
}

impl MockSession {
    fn new(
        api_key: &str,
        session_id: SessionId,
        connection_id: ConnectionId,
        fail_connect: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api_key: api_key.to_string(),
            session_id,
            connection_id,
            fail_connect,
            fail_signal: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            events,
            connected_token: Mutex::new(None),
            published: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Deliver an event to every subscriber. Returns the number of receivers.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Make subsequent signals fail.
    pub fn fail_signals(&self) {
        self.fail_signal.store(true, Ordering::SeqCst);
    }

    /// Make subsequent subscribes fail.
    pub fn fail_subscribes(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn connected_token(&self) -> Option<String> {
        lock(&self.connected_token).clone()
    }

    pub fn published(&self) -> Vec<PublisherId> {
        lock(&self.published).clone()
    }

    pub fn subscribed(&self) -> Vec<StreamId> {
        lock(&self.subscribed).clone()
    }

    pub fn signals(&self) -> Vec<Signal> {
        lock(&self.signals).clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SdkSession for MockSession {
    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn connect(&self, token: &str) -> Result<(), SdkError> {
        if self.fail_connect {
            return Err(SdkError::with_code(1004, "Authentication error"));
        }
        *lock(&self.connected_token) = Some(token.to_string());
        Ok(())
    }

    async fn publish(&self, publisher: &Arc<dyn SdkPublisher>) -> Result<(), SdkError> {
        if self.connection_id().is_none() {
            return Err(SdkError::with_code(1010, "Not connected"));
        }
        lock(&self.published).push(publisher.id().clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        stream: &StreamInfo,
        _options: SubscriberOptions,
    ) -> Result<(), SdkError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SdkError::with_code(1600, "Subscriber failed"));
        }
        lock(&self.subscribed).push(stream.stream_id.clone());
        Ok(())
    }

    async fn signal(&self, signal: Signal) -> Result<(), SdkError> {
        if self.fail_signal.load(Ordering::SeqCst) {
            return Err(SdkError::with_code(500, "Signal delivery failed"));
        }
        lock(&self.signals).push(signal.clone());
        // Signals echo back to the sender.
        self.emit(SessionEvent::SignalReceived(SignalEvent {
            signal_type: signal.signal_type,
            data: signal.data,
            from: self.connection_id.clone(),
        }));
        Ok(())
    }

    fn connection_id(&self) -> Option<ConnectionId> {
        if self.is_disconnected() {
            return None;
        }
        lock(&self.connected_token)
            .as_ref()
            .map(|_| self.connection_id.clone())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// A call recorded by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherCall {
    PublishAudio(bool),
    PublishVideo(bool),
    SetAudioSource(String),
    SetVideoSource(String),
    Destroy,
}

/// Recording mock publisher. Audio and video start enabled.
pub struct MockPublisher {
    id: PublisherId,
    options: PublisherOptions,
    events: broadcast::Sender<PublisherEvent>,
    audio_device: Mutex<Option<String>>,
    video_device: Mutex<Option<String>>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    fail_source_switch: bool,
    destroyed: AtomicBool,
    calls: Mutex<Vec<PublisherCall>>,
}

impl MockPublisher {
    fn new(id: PublisherId, options: PublisherOptions, fail_source_switch: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id,
            options,
            events,
            audio_device: Mutex::new(Some("default-audio".to_string())),
            video_device: Mutex::new(Some("default-video".to_string())),
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            fail_source_switch,
            destroyed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &PublisherOptions {
        &self.options
    }

    /// Simulate capture ending outside the page.
    pub fn emit_media_stopped(&self) -> usize {
        self.events
            .send(PublisherEvent::MediaStopped {
                publisher_id: self.id.clone(),
            })
            .unwrap_or(0)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<PublisherCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: PublisherCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait::async_trait]
impl SdkPublisher for MockPublisher {
    fn id(&self) -> &PublisherId {
        &self.id
    }

    fn events(&self) -> broadcast::Receiver<PublisherEvent> {
        self.events.subscribe()
    }

    fn publish_audio(&self, enabled: bool) {
        self.record(PublisherCall::PublishAudio(enabled));
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn publish_video(&self, enabled: bool) {
        self.record(PublisherCall::PublishVideo(enabled));
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    async fn set_audio_source(&self, device_id: &str) -> Result<(), SdkError> {
        self.record(PublisherCall::SetAudioSource(device_id.to_string()));
        if self.fail_source_switch {
            return Err(SdkError::with_code(1500, "Requested device not found"));
        }
        *lock(&self.audio_device) = Some(device_id.to_string());
        Ok(())
    }

    async fn set_video_source(&self, device_id: &str) -> Result<(), SdkError> {
        self.record(PublisherCall::SetVideoSource(device_id.to_string()));
        if self.fail_source_switch {
            return Err(SdkError::with_code(1500, "Requested device not found"));
        }
        *lock(&self.video_device) = Some(device_id.to_string());
        Ok(())
    }

    fn audio_source(&self) -> AudioSourceState {
        AudioSourceState {
            device_id: lock(&self.audio_device).clone(),
            enabled: self.audio_enabled.load(Ordering::SeqCst),
        }
    }

    fn video_source(&self) -> VideoSourceState {
        VideoSourceState {
            device_id: lock(&self.video_device).clone(),
            enabled: self.video_enabled.load(Ordering::SeqCst),
        }
    }

    fn destroy(&self) {
        self.record(PublisherCall::Destroy);
        self.destroyed.store(true, Ordering::SeqCst);
    }
}
