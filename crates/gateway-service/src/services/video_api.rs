//! Video platform REST client.
//!
//! Creates sessions and drives archives through the platform's REST API.
//! Every call is independent: nothing is cached and nothing is retried, so
//! the platform's own state is authoritative (stopping an already stopped
//! archive errors upstream and that error is passed through).
//!
//! Handlers depend on the [`VideoApi`] trait so tests can swap in
//! [`mock::MockVideoApi`] or point [`VideoApiClient`] at a wiremock server.

use crate::models::{Archive, ArchiveList, ArchiveOptions, SessionOptions, StartArchiveRequest};
use crate::observability::metrics::record_video_api_request;
use crate::services::project_auth::{project_jwt, AUTH_HEADER};
use common::secret::SecretString;
use common::types::{ArchiveId, SessionId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, instrument, warn};

/// Default timeout for platform requests in seconds.
const VIDEO_API_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Connect timeout for platform requests in seconds.
const VIDEO_API_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Errors returned by the platform client.
#[derive(Debug, Error)]
pub enum VideoApiError {
    /// The request never produced a response.
    #[error("Video platform unreachable: {0}")]
    Transport(String),

    /// The platform answered with a non-success status.
    #[error("Video platform returned status {status}")]
    Status { status: u16, body: String },

    /// A success response could not be decoded.
    #[error("Failed to decode video platform response: {0}")]
    Decode(String),

    /// The project JWT could not be signed.
    #[error("Failed to sign video platform request: {0}")]
    Auth(String),

    /// Session creation succeeded but returned no session.
    #[error("Video platform returned no session")]
    EmptySession,
}

impl VideoApiError {
    /// Best-effort JSON body describing this error for browsers.
    ///
    /// Upstream JSON bodies pass through as-is; anything else is wrapped
    /// as `{"error": "<text>"}`.
    pub fn error_body(&self) -> Value {
        match self {
            VideoApiError::Status { body, .. } => serde_json::from_str::<Value>(body)
                .unwrap_or_else(|_| json!({ "error": body })),
            other => json!({ "error": other.to_string() }),
        }
    }
}

/// Operations the gateway needs from the video platform.
#[async_trait::async_trait]
pub trait VideoApi: Send + Sync {
    /// Create a new session.
    async fn create_session(&self, options: SessionOptions) -> Result<SessionId, VideoApiError>;

    /// Start recording a session.
    async fn start_archive(
        &self,
        session_id: &SessionId,
        options: &ArchiveOptions,
    ) -> Result<Archive, VideoApiError>;

    /// Stop a recording.
    async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<Archive, VideoApiError>;

    /// List the most recent archives of the project.
    async fn list_archives(&self, count: u32) -> Result<ArchiveList, VideoApiError>;
}

/// One entry of the session creation response array.
#[derive(Debug, Deserialize)]
struct CreatedSession {
    session_id: SessionId,
}

/// REST client for the video platform.
#[derive(Clone)]
pub struct VideoApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
}

impl VideoApiClient {
    /// Create a new platform client.
    ///
    /// # Errors
    ///
    /// Returns `VideoApiError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        api_key: String,
        api_secret: SecretString,
    ) -> Result<Self, VideoApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(VIDEO_API_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(VIDEO_API_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "gw.services.video_api", error = %e, "Failed to build HTTP client");
                VideoApiError::Transport(e.to_string())
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            api_secret,
        })
    }

    fn auth_token(&self) -> Result<String, VideoApiError> {
        project_jwt(
            &self.api_key,
            &self.api_secret,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| {
            error!(target: "gw.services.video_api", error = %e, "Failed to sign project JWT");
            VideoApiError::Auth(e.to_string())
        })
    }

    fn archive_url(&self) -> String {
        format!("{}/v2/project/{}/archive", self.base_url, self.api_key)
    }

    /// Send a request and decode a JSON success body, recording metrics.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, VideoApiError> {
        let start = Instant::now();
        let result = self.send_and_decode(request).await;
        let status = if result.is_ok() { "success" } else { "error" };
        record_video_api_request(operation, status, start.elapsed());
        result
    }

    async fn send_and_decode<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, VideoApiError> {
        let response = request
            .header(AUTH_HEADER, self.auth_token()?)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gw.services.video_api", error = %e, "Video platform request failed");
                VideoApiError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "gw.services.video_api",
                status = %status,
                "Video platform returned error status"
            );
            return Err(VideoApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(target: "gw.services.video_api", error = %e, "Failed to parse video platform response");
            VideoApiError::Decode(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl VideoApi for VideoApiClient {
    #[instrument(skip(self))]
    async fn create_session(&self, options: SessionOptions) -> Result<SessionId, VideoApiError> {
        let url = format!("{}/session/create", self.base_url);
        let form = [
            ("archiveMode", options.archive_mode.as_str()),
            ("p2p.preference", options.media_mode.p2p_preference()),
        ];

        let sessions: Vec<CreatedSession> = self
            .execute("create_session", self.client.post(&url).form(&form))
            .await?;

        sessions
            .into_iter()
            .next()
            .map(|created| created.session_id)
            .ok_or(VideoApiError::EmptySession)
    }

    #[instrument(skip(self, options), fields(session_id = %session_id))]
    async fn start_archive(
        &self,
        session_id: &SessionId,
        options: &ArchiveOptions,
    ) -> Result<Archive, VideoApiError> {
        let body = StartArchiveRequest {
            session_id,
            options,
        };

        self.execute(
            "start_archive",
            self.client.post(self.archive_url()).json(&body),
        )
        .await
    }

    #[instrument(skip(self), fields(archive_id = %archive_id))]
    async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<Archive, VideoApiError> {
        let url = format!(
            "{}/{}/stop",
            self.archive_url(),
            urlencoding::encode(archive_id.as_str())
        );

        self.execute("stop_archive", self.client.post(&url)).await
    }

    #[instrument(skip(self))]
    async fn list_archives(&self, count: u32) -> Result<ArchiveList, VideoApiError> {
        let request = self
            .client
            .get(self.archive_url())
            .query(&[("count", count)]);

        self.execute("list_archives", request).await
    }
}

/// Mock platform client for tests.
///
/// Keeps archives in memory and enforces the same start/stop rules the
/// platform does: stopping an archive that is not recording fails.
pub mod mock {
    use super::*;
    use crate::models::ArchiveStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// In-memory stand-in for the video platform.
    pub struct MockVideoApi {
        archives: Mutex<Vec<Archive>>,
        sessions_created: AtomicUsize,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl Default for MockVideoApi {
        fn default() -> Self {
            Self::accepting()
        }
    }

    impl MockVideoApi {
        /// Create a mock where every call succeeds.
        pub fn accepting() -> Self {
            Self {
                archives: Mutex::new(Vec::new()),
                sessions_created: AtomicUsize::new(0),
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// Create a mock where every call fails with a 500 from upstream.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::accepting()
            }
        }

        /// Number of calls made through the trait.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Snapshot of the stored archives, oldest first.
        pub fn archives(&self) -> Vec<Archive> {
            self.archives
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn begin_call(&self) -> Result<(), VideoApiError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.return_error {
                return Err(VideoApiError::Status {
                    status: 500,
                    body: r#"{"code":500,"message":"Mock video platform error"}"#.to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl VideoApi for MockVideoApi {
        async fn create_session(
            &self,
            _options: SessionOptions,
        ) -> Result<SessionId, VideoApiError> {
            self.begin_call()?;
            let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SessionId::new(format!("1_mock-session-{n}")))
        }

        async fn start_archive(
            &self,
            session_id: &SessionId,
            options: &ArchiveOptions,
        ) -> Result<Archive, VideoApiError> {
            self.begin_call()?;
            let mut archives = self.archives.lock().unwrap_or_else(PoisonError::into_inner);

            let already_recording = archives.iter().any(|a| {
                a.session_id.as_ref() == Some(session_id) && a.status == ArchiveStatus::Started
            });
            if already_recording {
                return Err(VideoApiError::Status {
                    status: 409,
                    body: r#"{"code":409,"message":"Session is already being recorded"}"#
                        .to_string(),
                });
            }

            let archive = Archive {
                id: ArchiveId::new(uuid::Uuid::new_v4().to_string()),
                status: ArchiveStatus::Started,
                name: Some(options.name.clone()),
                session_id: Some(session_id.clone()),
                created_at: chrono::Utc::now().timestamp_millis(),
                duration: 0,
                size: 0,
                output_mode: Some(options.output_mode),
                url: None,
                reason: None,
                extra: serde_json::Map::new(),
            };
            archives.push(archive.clone());
            Ok(archive)
        }

        async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<Archive, VideoApiError> {
            self.begin_call()?;
            let mut archives = self.archives.lock().unwrap_or_else(PoisonError::into_inner);

            let Some(archive) = archives.iter_mut().find(|a| &a.id == archive_id) else {
                return Err(VideoApiError::Status {
                    status: 404,
                    body: r#"{"code":404,"message":"Archive not found"}"#.to_string(),
                });
            };

            if archive.status != ArchiveStatus::Started {
                return Err(VideoApiError::Status {
                    status: 409,
                    body: r#"{"code":409,"message":"Archive is not currently recording"}"#
                        .to_string(),
                });
            }

            archive.status = ArchiveStatus::Stopped;
            archive.reason = Some("user initiated".to_string());
            Ok(archive.clone())
        }

        async fn list_archives(&self, count: u32) -> Result<ArchiveList, VideoApiError> {
            self.begin_call()?;
            let archives = self.archives.lock().unwrap_or_else(PoisonError::into_inner);

            // Newest first, like the platform.
            let items: Vec<Archive> = archives
                .iter()
                .rev()
                .take(count as usize)
                .cloned()
                .collect();

            Ok(ArchiveList {
                count: archives.len() as u64,
                items,
            })
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;
        use crate::models::ArchiveOptions;

        #[tokio::test]
        async fn test_mock_creates_distinct_sessions() {
            let mock = MockVideoApi::accepting();
            let a = mock.create_session(SessionOptions::default()).await.unwrap();
            let b = mock.create_session(SessionOptions::default()).await.unwrap();

            assert_ne!(a, b);
            assert_eq!(mock.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_stop_after_start() {
            let mock = MockVideoApi::accepting();
            let session = SessionId::from("sess");
            let options = ArchiveOptions::for_session_recording(chrono::Utc::now());

            let started = mock.start_archive(&session, &options).await.unwrap();
            assert_eq!(started.status, ArchiveStatus::Started);

            let stopped = mock.stop_archive(&started.id).await.unwrap();
            assert_eq!(stopped.status, ArchiveStatus::Stopped);

            let again = mock.stop_archive(&started.id).await;
            assert!(matches!(again, Err(VideoApiError::Status { status: 409, .. })));
        }

        #[tokio::test]
        async fn test_mock_failing() {
            let mock = MockVideoApi::failing();
            let result = mock.create_session(SessionOptions::default()).await;
            assert!(matches!(result, Err(VideoApiError::Status { status: 500, .. })));
        }
    }
}
