//! Device preselection screen.
//!
//! The landing page lists the microphones and cameras the SDK reports,
//! offers a live preview, and on create/join saves the preview's device
//! state so the call page starts with the same choices.

use crate::controller::session_url;
use crate::errors::ClientError;
use crate::gateway::GatewayApi;
use crate::preferences::{DevicePreferences, DevicePreferencesRepository, PreferenceStore};
use crate::sdk::{Device, PublisherOptions, SdkPublisher, VideoPlatform};
use common::types::SessionId;
use std::sync::Arc;
use tracing::{debug, info, warn};

const AUDIO_INPUT: &str = "audioinput";
const VIDEO_INPUT: &str = "videoinput";

pub const NO_AUDIO_LABEL: &str = "No audio";
pub const NO_VIDEO_LABEL: &str = "No video";

/// One entry of a device selector. An empty id means "off".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOption {
    pub device_id: String,
    pub label: String,
}

impl DeviceOption {
    fn from_device(device: &Device) -> Self {
        Self {
            device_id: device.device_id.clone(),
            label: device.label.clone(),
        }
    }

    fn off(label: &str) -> Self {
        Self {
            device_id: String::new(),
            label: label.to_string(),
        }
    }

    pub fn is_off(&self) -> bool {
        self.device_id.is_empty()
    }
}

pub struct PreselectionScreen {
    platform: Arc<dyn VideoPlatform>,
    gateway: Arc<dyn GatewayApi>,
    preferences: DevicePreferencesRepository<Arc<dyn PreferenceStore>>,
    audio_options: Vec<DeviceOption>,
    video_options: Vec<DeviceOption>,
    selected_audio: String,
    selected_video: String,
    preview: Option<Arc<dyn SdkPublisher>>,
}

impl PreselectionScreen {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        gateway: Arc<dyn GatewayApi>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            platform,
            gateway,
            preferences: DevicePreferencesRepository::new(preferences),
            audio_options: Vec::new(),
            video_options: Vec::new(),
            selected_audio: String::new(),
            selected_video: String::new(),
            preview: None,
        }
    }

    /// Enumerate input devices into the two selectors.
    ///
    /// Each list ends with an "off" entry. The first entry is selected.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnsupportedBrowser` if devices cannot be listed.
    pub async fn load_devices(&mut self) -> Result<(), ClientError> {
        let devices = self.platform.devices().await.map_err(|e| {
            warn!(target: "client.preselection", error = %e, "Device enumeration failed");
            ClientError::UnsupportedBrowser
        })?;

        let of_kind = |kind: &str| -> Vec<DeviceOption> {
            devices
                .iter()
                .filter(|device| device.kind.eq_ignore_ascii_case(kind))
                .map(DeviceOption::from_device)
                .collect()
        };

        let mut audio = of_kind(AUDIO_INPUT);
        audio.push(DeviceOption::off(NO_AUDIO_LABEL));
        let mut video = of_kind(VIDEO_INPUT);
        video.push(DeviceOption::off(NO_VIDEO_LABEL));

        self.selected_audio = audio.first().map(|o| o.device_id.clone()).unwrap_or_default();
        self.selected_video = video.first().map(|o| o.device_id.clone()).unwrap_or_default();
        self.audio_options = audio;
        self.video_options = video;

        debug!(
            target: "client.preselection",
            audio = self.audio_options.len() - 1,
            video = self.video_options.len() - 1,
            "Devices loaded"
        );
        Ok(())
    }

    pub fn audio_options(&self) -> &[DeviceOption] {
        &self.audio_options
    }

    pub fn video_options(&self) -> &[DeviceOption] {
        &self.video_options
    }

    pub fn selected_audio(&self) -> &str {
        &self.selected_audio
    }

    pub fn selected_video(&self) -> &str {
        &self.selected_video
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Start the local preview with the current selections.
    ///
    /// A running preview is replaced. If the selections cannot be applied
    /// the new preview is destroyed and no preview is left running.
    pub async fn start_preview(&mut self) -> Result<(), ClientError> {
        if let Some(old) = self.preview.take() {
            old.destroy();
        }

        let publisher = self
            .platform
            .init_publisher(PublisherOptions::preview())
            .await?;
        let applied = async {
            apply_audio(publisher.as_ref(), &self.selected_audio).await?;
            apply_video(publisher.as_ref(), &self.selected_video).await
        }
        .await;
        if let Err(e) = applied {
            warn!(target: "client.preselection", error = %e, "Preview selections not applied");
            publisher.destroy();
            return Err(e);
        }

        self.preview = Some(publisher);
        Ok(())
    }

    /// Change the audio selection. Applied to the preview immediately.
    pub async fn select_audio(&mut self, device_id: &str) -> Result<(), ClientError> {
        if !self.audio_options.iter().any(|o| o.device_id == device_id) {
            return Err(ClientError::Validation(format!(
                "Unknown audio device: {device_id}"
            )));
        }
        self.selected_audio = device_id.to_string();
        if let Some(preview) = &self.preview {
            apply_audio(preview.as_ref(), device_id).await?;
        }
        Ok(())
    }

    /// Change the video selection. Applied to the preview immediately.
    pub async fn select_video(&mut self, device_id: &str) -> Result<(), ClientError> {
        if !self.video_options.iter().any(|o| o.device_id == device_id) {
            return Err(ClientError::Validation(format!(
                "Unknown video device: {device_id}"
            )));
        }
        self.selected_video = device_id.to_string();
        if let Some(preview) = &self.preview {
            apply_video(preview.as_ref(), device_id).await?;
        }
        Ok(())
    }

    /// Create a new session and return the call page URL to navigate to.
    ///
    /// # Errors
    ///
    /// `ClientError::Validation("Name required")` before any request when
    /// `name` is empty; gateway errors otherwise.
    pub async fn create_session(&mut self, name: &str) -> Result<String, ClientError> {
        if name.is_empty() {
            return Err(ClientError::Validation("Name required".to_string()));
        }
        let session_id = self.gateway.create_session().await?;
        self.leave()?;

        info!(target: "client.preselection", session_id = %session_id, "Session created");
        Ok(session_url(&session_id, Some(name)))
    }

    /// Join an existing session and return the call page URL.
    pub fn join_session(&mut self, session_id: &str, name: &str) -> Result<String, ClientError> {
        if session_id.is_empty() || name.is_empty() {
            return Err(ClientError::Validation(
                "Name and SessionID required".to_string(),
            ));
        }
        self.leave()?;
        Ok(session_url(&SessionId::new(session_id), Some(name)))
    }

    /// Save the preview's device state and stop it.
    fn leave(&mut self) -> Result<(), ClientError> {
        let Some(preview) = self.preview.take() else {
            return Ok(());
        };

        let audio = preview.audio_source();
        let video = preview.video_source();
        self.preferences.save(&DevicePreferences {
            audio_source_id: audio.device_id,
            video_source_id: video.device_id,
            audio_enabled: Some(audio.enabled),
            video_enabled: Some(video.enabled),
        })?;
        preview.destroy();
        Ok(())
    }
}

async fn apply_audio(publisher: &dyn SdkPublisher, device_id: &str) -> Result<(), ClientError> {
    if device_id.is_empty() {
        publisher.publish_audio(false);
    } else {
        publisher.set_audio_source(device_id).await?;
        publisher.publish_audio(true);
    }
    Ok(())
}

async fn apply_video(publisher: &dyn SdkPublisher, device_id: &str) -> Result<(), ClientError> {
    if device_id.is_empty() {
        publisher.publish_video(false);
    } else {
        publisher.set_video_source(device_id).await?;
        publisher.publish_video(true);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::preferences::MemoryPreferenceStore;
    use crate::sdk::mock::{MockPlatform, PublisherCall};

    struct Fixture {
        platform: Arc<MockPlatform>,
        store: Arc<MemoryPreferenceStore>,
        screen: PreselectionScreen,
    }

    fn fixture_with(platform: MockPlatform) -> Fixture {
        let platform = Arc::new(platform);
        let store = Arc::new(MemoryPreferenceStore::new());
        let screen = PreselectionScreen::new(
            platform.clone(),
            Arc::new(MockGateway::accepting()),
            store.clone(),
        );
        Fixture {
            platform,
            store,
            screen,
        }
    }

    fn device(id: &str, kind: &str) -> Device {
        Device {
            device_id: id.to_string(),
            label: format!("Device {id}"),
            kind: kind.to_string(),
        }
    }

    #[tokio::test]
    async fn test_device_lists_end_with_off_option() {
        let mut f = fixture_with(MockPlatform::new().with_devices(vec![
            device("mic-1", "audioinput"),
            device("cam-1", "VideoInput"),
            device("mic-2", "AUDIOINPUT"),
            device("spk-1", "audiooutput"),
        ]));
        f.screen.load_devices().await.unwrap();

        let audio: Vec<&str> = f
            .screen
            .audio_options()
            .iter()
            .map(|o| o.device_id.as_str())
            .collect();
        assert_eq!(audio, vec!["mic-1", "mic-2", ""]);
        assert_eq!(f.screen.audio_options().last().unwrap().label, NO_AUDIO_LABEL);
        assert_eq!(f.screen.video_options().len(), 2);
        assert_eq!(f.screen.selected_audio(), "mic-1");
        assert_eq!(f.screen.selected_video(), "cam-1");
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_unsupported_browser() {
        let mut f = fixture_with(MockPlatform::new().without_device_access());
        let err = f.screen.load_devices().await.unwrap_err();
        assert_eq!(err.to_string(), "Not a supported browser");
    }

    #[tokio::test]
    async fn test_preview_uses_video_id_for_video_source() {
        let mut f = fixture_with(MockPlatform::new());
        f.screen.load_devices().await.unwrap();
        f.screen.start_preview().await.unwrap();

        let preview = f.platform.publishers().first().cloned().unwrap();
        assert_eq!(
            preview.calls(),
            vec![
                PublisherCall::SetAudioSource("mic-1".to_string()),
                PublisherCall::PublishAudio(true),
                PublisherCall::SetVideoSource("cam-1".to_string()),
                PublisherCall::PublishVideo(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_preview_is_destroyed() {
        let mut f = fixture_with(MockPlatform::new().failing_source_switch());
        f.screen.load_devices().await.unwrap();

        let err = f.screen.start_preview().await.unwrap_err();

        assert!(matches!(err, ClientError::Sdk(_)));
        assert!(!f.screen.has_preview());
        let preview = f.platform.publishers().first().cloned().unwrap();
        assert!(preview.is_destroyed());
    }

    #[tokio::test]
    async fn test_selection_applies_live() {
        let mut f = fixture_with(MockPlatform::new());
        f.screen.load_devices().await.unwrap();

        // No preview yet: only the selection changes.
        f.screen.select_video("").await.unwrap();
        assert!(f.platform.publishers().is_empty());

        f.screen.start_preview().await.unwrap();
        f.screen.select_audio("").await.unwrap();

        let preview = f.platform.publishers().first().cloned().unwrap();
        assert!(!preview.audio_source().enabled);
        assert!(!preview.video_source().enabled);
    }

    #[tokio::test]
    async fn test_unknown_device_is_rejected() {
        let mut f = fixture_with(MockPlatform::new());
        f.screen.load_devices().await.unwrap();
        assert!(matches!(
            f.screen.select_audio("nope").await,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(f.screen.selected_audio(), "mic-1");
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let mut f = fixture_with(MockPlatform::new());
        let err = f.screen.create_session("").await.unwrap_err();
        assert_eq!(err.to_string(), "Name required");
    }

    #[tokio::test]
    async fn test_create_returns_session_url() {
        let mut f = fixture_with(MockPlatform::new());
        let url = f.screen.create_session("Ada Lovelace").await.unwrap();
        assert_eq!(url, "/session/1_MX4mock-session-1?name=Ada%20Lovelace");
    }

    #[tokio::test]
    async fn test_join_requires_name_and_session() {
        let mut f = fixture_with(MockPlatform::new());
        for (session, name) in [("", "bob"), ("1_MX4abc", ""), ("", "")] {
            let err = f.screen.join_session(session, name).unwrap_err();
            assert_eq!(err.to_string(), "Name and SessionID required");
        }
    }

    #[tokio::test]
    async fn test_join_snapshots_preview_into_preferences() {
        let mut f = fixture_with(MockPlatform::new());
        f.screen.load_devices().await.unwrap();
        f.screen.start_preview().await.unwrap();
        f.screen.select_video("").await.unwrap();

        let url = f.screen.join_session("1_MX4abc", "bob").unwrap();
        assert_eq!(url, "/session/1_MX4abc?name=bob");

        let saved = DevicePreferencesRepository::new(f.store.clone()).load().unwrap();
        assert_eq!(saved.audio_source_id.as_deref(), Some("mic-1"));
        assert_eq!(saved.video_source_id.as_deref(), Some("cam-1"));
        assert_eq!(saved.audio_enabled, Some(true));
        assert_eq!(saved.video_enabled, Some(false));

        let preview = f.platform.publishers().first().cloned().unwrap();
        assert!(preview.is_destroyed());
    }

    #[tokio::test]
    async fn test_join_without_preview_saves_nothing() {
        let mut f = fixture_with(MockPlatform::new());
        f.screen.join_session("1_MX4abc", "bob").unwrap();

        let saved = DevicePreferencesRepository::new(f.store.clone()).load().unwrap();
        assert_eq!(saved, DevicePreferences::default());
    }
}
