//! Device preferences repository.
//!
//! The preselection screen writes the chosen devices and mute state; the call
//! page reads them when it creates its publisher. Values are stored as
//! strings under fixed keys, booleans JSON-encoded (`"true"` / `"false"`),
//! last write wins.

use crate::sdk::{SdkError, SdkPublisher};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Preference storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preference storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    VideoSourceId,
    AudioSourceId,
    AudioEnabled,
    VideoEnabled,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 4] = [
        PreferenceKey::VideoSourceId,
        PreferenceKey::AudioSourceId,
        PreferenceKey::AudioEnabled,
        PreferenceKey::VideoEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::VideoSourceId => "videoSourceId",
            PreferenceKey::AudioSourceId => "audioSourceId",
            PreferenceKey::AudioEnabled => "audioEnabled",
            PreferenceKey::VideoEnabled => "videoEnabled",
        }
    }
}

/// Raw string key-value storage.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PreferencesError>;

    fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError>;

    fn remove(&self, key: &str) -> Result<(), PreferencesError>;
}

impl<T: PreferenceStore + ?Sized> PreferenceStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, PreferencesError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PreferencesError> {
        (**self).remove(key)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferencesError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PreferencesError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Every write rewrites the whole file through a temporary file and a
/// rename, so readers never observe a partial file.
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, PreferencesError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), PreferencesError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        apply(&mut map);
        self.write_map(&map)
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferencesError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), PreferencesError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

/// Saved device choices. `None` means nothing saved for that key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePreferences {
    pub audio_source_id: Option<String>,
    pub video_source_id: Option<String>,
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

impl DevicePreferences {
    /// Reapply saved choices to a freshly created publisher.
    ///
    /// Unsaved values keep the publisher's defaults (both enabled). Each
    /// setting is applied on its own: a source that cannot be switched does
    /// not stop the saved mute state from being applied. The first source
    /// error is returned once everything has been attempted.
    pub async fn apply_to(&self, publisher: &dyn SdkPublisher) -> Result<(), SdkError> {
        let mut first_error = None;

        if let Some(device_id) = non_empty(&self.video_source_id) {
            if let Err(e) = publisher.set_video_source(device_id).await {
                warn!(target: "client.preferences", device_id, error = %e, "Saved video source not applied");
                first_error.get_or_insert(e);
            }
        }
        if let Some(device_id) = non_empty(&self.audio_source_id) {
            if let Err(e) = publisher.set_audio_source(device_id).await {
                warn!(target: "client.preferences", device_id, error = %e, "Saved audio source not applied");
                first_error.get_or_insert(e);
            }
        }
        if let Some(enabled) = self.audio_enabled {
            publisher.publish_audio(enabled);
        }
        if let Some(enabled) = self.video_enabled {
            publisher.publish_video(enabled);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Typed access to device preferences over any [`PreferenceStore`].
#[derive(Debug, Clone)]
pub struct DevicePreferencesRepository<S> {
    store: S,
}

impl<S: PreferenceStore> DevicePreferencesRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load(&self) -> Result<DevicePreferences, PreferencesError> {
        Ok(DevicePreferences {
            audio_source_id: self.store.get(PreferenceKey::AudioSourceId.as_str())?,
            video_source_id: self.store.get(PreferenceKey::VideoSourceId.as_str())?,
            audio_enabled: self.load_bool(PreferenceKey::AudioEnabled)?,
            video_enabled: self.load_bool(PreferenceKey::VideoEnabled)?,
        })
    }

    /// Write every field; `None` removes the key.
    pub fn save(&self, preferences: &DevicePreferences) -> Result<(), PreferencesError> {
        self.save_string(PreferenceKey::AudioSourceId, &preferences.audio_source_id)?;
        self.save_string(PreferenceKey::VideoSourceId, &preferences.video_source_id)?;
        self.save_bool(PreferenceKey::AudioEnabled, preferences.audio_enabled)?;
        self.save_bool(PreferenceKey::VideoEnabled, preferences.video_enabled)?;
        debug!(target: "client.preferences", ?preferences, "Device preferences saved");
        Ok(())
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> Result<(), PreferencesError> {
        self.save_bool(PreferenceKey::AudioEnabled, Some(enabled))
    }

    pub fn set_video_enabled(&self, enabled: bool) -> Result<(), PreferencesError> {
        self.save_bool(PreferenceKey::VideoEnabled, Some(enabled))
    }

    fn load_bool(&self, key: PreferenceKey) -> Result<Option<bool>, PreferencesError> {
        let Some(raw) = self.store.get(key.as_str())? else {
            return Ok(None);
        };
        match serde_json::from_str::<bool>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                warn!(target: "client.preferences", key = key.as_str(), raw = %raw, "Ignoring unparsable preference");
                Ok(None)
            }
        }
    }

    fn save_bool(&self, key: PreferenceKey, value: Option<bool>) -> Result<(), PreferencesError> {
        match value {
            Some(value) => self.store.set(key.as_str(), &serde_json::to_string(&value)?),
            None => self.store.remove(key.as_str()),
        }
    }

    fn save_string(
        &self,
        key: PreferenceKey,
        value: &Option<String>,
    ) -> Result<(), PreferencesError> {
        match value {
            Some(value) => self.store.set(key.as_str(), value),
            None => self.store.remove(key.as_str()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sdk::mock::{MockPlatform, PublisherCall};
    use crate::sdk::{PublisherOptions, VideoPlatform};

    #[test]
    fn test_storage_keys() {
        let keys: Vec<&str> = PreferenceKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["videoSourceId", "audioSourceId", "audioEnabled", "videoEnabled"]
        );
    }

    #[test]
    fn test_booleans_are_json_encoded() {
        let repo = DevicePreferencesRepository::new(MemoryPreferenceStore::new());
        repo.set_audio_enabled(false).unwrap();
        repo.set_video_enabled(true).unwrap();

        assert_eq!(
            repo.store().get("audioEnabled").unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(
            repo.store().get("videoEnabled").unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_unparsable_boolean_is_absent() {
        let store = MemoryPreferenceStore::new();
        store.set("audioEnabled", "yes please").unwrap();
        let repo = DevicePreferencesRepository::new(store);

        assert_eq!(repo.load().unwrap().audio_enabled, None);
    }

    #[test]
    fn test_empty_store_loads_defaults() {
        let repo = DevicePreferencesRepository::new(MemoryPreferenceStore::new());
        assert_eq!(repo.load().unwrap(), DevicePreferences::default());
    }

    #[test]
    fn test_save_none_removes_key() {
        let repo = DevicePreferencesRepository::new(MemoryPreferenceStore::new());
        repo.save(&DevicePreferences {
            audio_source_id: Some("mic-1".to_string()),
            ..Default::default()
        })
        .unwrap();
        repo.save(&DevicePreferences::default()).unwrap();

        assert_eq!(repo.store().get("audioSourceId").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let saved = DevicePreferences {
            audio_source_id: Some("mic-1".to_string()),
            video_source_id: Some("cam-2".to_string()),
            audio_enabled: Some(true),
            video_enabled: Some(false),
        };
        DevicePreferencesRepository::new(JsonFilePreferenceStore::new(&path))
            .save(&saved)
            .unwrap();

        // A fresh store over the same file sees the same values.
        let reloaded = DevicePreferencesRepository::new(JsonFilePreferenceStore::new(&path))
            .load()
            .unwrap();
        assert_eq!(reloaded, saved);

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw.get("videoEnabled").map(String::as_str), Some("false"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferenceStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("audioEnabled").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFilePreferenceStore::new(&path);
        assert!(matches!(
            store.get("audioEnabled"),
            Err(PreferencesError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_reapplies_both_sources() {
        let platform = MockPlatform::new();
        let publisher = platform
            .init_publisher(PublisherOptions::camera(None))
            .await
            .unwrap();

        DevicePreferences {
            audio_source_id: Some("mic-2".to_string()),
            video_source_id: Some("cam-2".to_string()),
            audio_enabled: Some(false),
            video_enabled: None,
        }
        .apply_to(publisher.as_ref())
        .await
        .unwrap();

        assert_eq!(publisher.audio_source().device_id.as_deref(), Some("mic-2"));
        assert_eq!(publisher.video_source().device_id.as_deref(), Some("cam-2"));
        assert!(!publisher.audio_source().enabled);
        assert!(publisher.video_source().enabled);
    }

    #[tokio::test]
    async fn test_apply_keeps_mute_state_when_source_switch_fails() {
        let platform = MockPlatform::new().failing_source_switch();
        let publisher = platform
            .init_publisher(PublisherOptions::camera(None))
            .await
            .unwrap();

        let err = DevicePreferences {
            audio_source_id: Some("unplugged-mic".to_string()),
            video_source_id: Some("unplugged-cam".to_string()),
            audio_enabled: Some(false),
            video_enabled: Some(false),
        }
        .apply_to(publisher.as_ref())
        .await
        .unwrap_err();

        assert_eq!(err.message, "Requested device not found");
        assert!(!publisher.audio_source().enabled);
        assert!(!publisher.video_source().enabled);

        let mock = platform.publishers().pop().unwrap();
        assert_eq!(
            mock.calls(),
            vec![
                PublisherCall::SetVideoSource("unplugged-cam".to_string()),
                PublisherCall::SetAudioSource("unplugged-mic".to_string()),
                PublisherCall::PublishAudio(false),
                PublisherCall::PublishVideo(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_skips_empty_source_ids() {
        let platform = MockPlatform::new();
        let publisher = platform
            .init_publisher(PublisherOptions::camera(None))
            .await
            .unwrap();

        DevicePreferences {
            audio_source_id: Some(String::new()),
            video_source_id: None,
            audio_enabled: None,
            video_enabled: None,
        }
        .apply_to(publisher.as_ref())
        .await
        .unwrap();

        let mock = platform.publishers().pop().unwrap();
        assert!(!mock
            .calls()
            .iter()
            .any(|c| matches!(c, PublisherCall::SetAudioSource(_))));
    }
}
