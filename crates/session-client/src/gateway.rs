//! HTTP client for the gateway service.
//!
//! Covers the gateway's JSON API: session creation, participant credentials
//! and archive control. The controller and preselection screen depend on
//! [`GatewayApi`] so tests can use [`mock::MockGateway`] or point
//! [`GatewayClient`] at a wiremock server.

use crate::errors::ClientError;
use common::types::{ArchiveId, SessionId};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Default timeout for gateway requests in seconds.
const GATEWAY_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Participant credentials for one session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub session_id: SessionId,
    pub api_key: String,
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("session_id", &self.session_id)
            .field("api_key", &self.api_key)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Archive metadata as relayed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub id: ArchiveId,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Most recent archives of the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveListing {
    /// Total archives in the project, not just this page.
    pub count: u64,
    pub items: Vec<ArchiveInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody {
    session_id: SessionId,
}

/// Gateway operations used by the browser client.
#[async_trait::async_trait]
pub trait GatewayApi: Send + Sync {
    async fn create_session(&self) -> Result<SessionId, ClientError>;

    async fn credentials(&self, session_id: &SessionId) -> Result<Credentials, ClientError>;

    async fn start_archive(&self, session_id: &SessionId) -> Result<ArchiveInfo, ClientError>;

    async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<ArchiveInfo, ClientError>;

    async fn list_archives(&self) -> Result<ArchiveListing, ClientError>;
}

/// reqwest-backed gateway client.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`, e.g. `http://localhost:3000`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GATEWAY_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "client.gateway", error = %e, "Failed to build HTTP client");
                ClientError::Transport(e.to_string())
            })?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|e| {
            warn!(target: "client.gateway", error = %e, "Gateway request failed");
            ClientError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "client.gateway",
                status = %status,
                "Gateway returned error status"
            );
            return Err(ClientError::Gateway {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(target: "client.gateway", error = %e, "Failed to parse gateway response");
            ClientError::Decode(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl GatewayApi for GatewayClient {
    #[instrument(skip(self))]
    async fn create_session(&self) -> Result<SessionId, ClientError> {
        let body: CreateSessionBody = self
            .execute(self.client.post(format!("{}/api/create", self.base_url)))
            .await?;
        debug!(target: "client.gateway", session_id = %body.session_id, "Session created");
        Ok(body.session_id)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn credentials(&self, session_id: &SessionId) -> Result<Credentials, ClientError> {
        self.execute(
            self.client
                .post(format!("{}/api/credentials", self.base_url))
                .json(&json!({ "sessionId": session_id })),
        )
        .await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn start_archive(&self, session_id: &SessionId) -> Result<ArchiveInfo, ClientError> {
        let url = format!(
            "{}/api/archive/start/{}",
            self.base_url,
            urlencoding::encode(session_id.as_str())
        );
        self.execute(self.client.post(url)).await
    }

    #[instrument(skip(self), fields(archive_id = %archive_id))]
    async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<ArchiveInfo, ClientError> {
        let url = format!(
            "{}/api/archive/{}/stop",
            self.base_url,
            urlencoding::encode(archive_id.as_str())
        );
        self.execute(self.client.post(url)).await
    }

    #[instrument(skip(self))]
    async fn list_archives(&self) -> Result<ArchiveListing, ClientError> {
        self.execute(self.client.get(format!("{}/api/archive/list", self.base_url)))
            .await
    }
}

/// In-memory gateway for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mock gateway. Archives move through `started` and `stopped`.
    pub struct MockGateway {
        api_key: String,
        fail_credentials: AtomicBool,
        fail_archives: AtomicBool,
        next_session: AtomicUsize,
        next_archive: AtomicUsize,
        credential_calls: AtomicUsize,
        archives: Mutex<Vec<ArchiveInfo>>,
        started: Mutex<Vec<SessionId>>,
        stopped: Mutex<Vec<ArchiveId>>,
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self::accepting()
        }
    }

    impl MockGateway {
        /// Every call succeeds.
        pub fn accepting() -> Self {
            Self {
                api_key: "46000001".to_string(),
                fail_credentials: AtomicBool::new(false),
                fail_archives: AtomicBool::new(false),
                next_session: AtomicUsize::new(0),
                next_archive: AtomicUsize::new(0),
                credential_calls: AtomicUsize::new(0),
                archives: Mutex::new(Vec::new()),
                started: Mutex::new(Vec::new()),
                stopped: Mutex::new(Vec::new()),
            }
        }

        /// Credential requests fail with a 500.
        pub fn failing_credentials() -> Self {
            let gateway = Self::accepting();
            gateway.fail_credentials.store(true, Ordering::SeqCst);
            gateway
        }

        /// Archive requests fail with a 500.
        pub fn failing_archives() -> Self {
            let gateway = Self::accepting();
            gateway.fail_archives.store(true, Ordering::SeqCst);
            gateway
        }

        pub fn api_key(&self) -> &str {
            &self.api_key
        }

        /// Token handed out for `session_id`.
        pub fn token_for(session_id: &SessionId) -> String {
            format!("T1==mock-token-{session_id}")
        }

        pub fn credential_calls(&self) -> usize {
            self.credential_calls.load(Ordering::SeqCst)
        }

        /// Sessions passed to `start_archive`, in call order.
        pub fn started(&self) -> Vec<SessionId> {
            lock(&self.started).clone()
        }

        /// Archives passed to `stop_archive`, in call order.
        pub fn stopped(&self) -> Vec<ArchiveId> {
            lock(&self.stopped).clone()
        }

        fn server_error() -> ClientError {
            ClientError::Gateway {
                status: 500,
                body: r#"{"error":"mock failure"}"#.to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl GatewayApi for MockGateway {
        async fn create_session(&self) -> Result<SessionId, ClientError> {
            let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SessionId::new(format!("1_MX4mock-session-{n}")))
        }

        async fn credentials(&self, session_id: &SessionId) -> Result<Credentials, ClientError> {
            self.credential_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_credentials.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            Ok(Credentials {
                session_id: session_id.clone(),
                api_key: self.api_key.clone(),
                token: Self::token_for(session_id),
            })
        }

        async fn start_archive(&self, session_id: &SessionId) -> Result<ArchiveInfo, ClientError> {
            lock(&self.started).push(session_id.clone());
            if self.fail_archives.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let n = self.next_archive.fetch_add(1, Ordering::SeqCst) + 1;
            let archive = ArchiveInfo {
                id: ArchiveId::new(format!("archive-{n}")),
                status: "started".to_string(),
                name: Some(format!("archive-{n}")),
                session_id: Some(session_id.clone()),
                extra: serde_json::Map::new(),
            };
            lock(&self.archives).push(archive.clone());
            Ok(archive)
        }

        async fn stop_archive(&self, archive_id: &ArchiveId) -> Result<ArchiveInfo, ClientError> {
            lock(&self.stopped).push(archive_id.clone());
            if self.fail_archives.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let mut archives = lock(&self.archives);
            match archives.iter_mut().find(|a| &a.id == archive_id) {
                Some(archive) if archive.status == "started" => {
                    archive.status = "stopped".to_string();
                    Ok(archive.clone())
                }
                Some(_) => Err(ClientError::Gateway {
                    status: 409,
                    body: json!({ "archiveId": archive_id, "error": { "code": 409 } })
                        .to_string(),
                }),
                None => Err(ClientError::Gateway {
                    status: 404,
                    body: json!({ "archiveId": archive_id, "error": { "code": 404 } })
                        .to_string(),
                }),
            }
        }

        async fn list_archives(&self) -> Result<ArchiveListing, ClientError> {
            if self.fail_archives.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let archives = lock(&self.archives);
            Ok(ArchiveListing {
                count: archives.len() as u64,
                items: archives.iter().rev().take(10).cloned().collect(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::mock::MockGateway;
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "sessionId": "1_MX4abc" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(server.uri()).unwrap();
        let session_id = client.create_session().await.unwrap();
        assert_eq!(session_id.as_str(), "1_MX4abc");
    }

    #[tokio::test]
    async fn test_credentials_posts_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/credentials"))
            .and(body_json(json!({ "sessionId": "1_MX4abc" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sessionId": "1_MX4abc",
                "apiKey": "46000001",
                "token": "T1==secret"
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::new(format!("{}/", server.uri())).unwrap();
        let credentials = client
            .credentials(&SessionId::from("1_MX4abc"))
            .await
            .unwrap();

        assert_eq!(credentials.api_key, "46000001");
        assert_eq!(credentials.token, "T1==secret");
        assert!(!format!("{credentials:?}").contains("T1==secret"));
    }

    #[tokio::test]
    async fn test_archive_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/archive/start/1_MX4abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "arch-1", "status": "started", "sessionId": "1_MX4abc", "size": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/archive/arch-1/stop"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "arch-1", "status": "stopped" })),
            )
            .mount(&server)
            .await;

        let client = GatewayClient::new(server.uri()).unwrap();
        let started = client
            .start_archive(&SessionId::from("1_MX4abc"))
            .await
            .unwrap();
        assert_eq!(started.status, "started");
        assert_eq!(started.extra["size"], 0);

        let stopped = client.stop_archive(&started.id).await.unwrap();
        assert_eq!(stopped.status, "stopped");
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/archive/arch-1/stop"))
            .respond_with(ResponseTemplate::new(409).set_body_string(
                r#"{"archiveId":"arch-1","error":{"code":409}}"#,
            ))
            .mount(&server)
            .await;

        let client = GatewayClient::new(server.uri()).unwrap();
        let err = client
            .stop_archive(&ArchiveId::from("arch-1"))
            .await
            .unwrap_err();

        match err {
            ClientError::Gateway { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("arch-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/archive/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GatewayClient::new(server.uri()).unwrap();
        let err = client.list_archives().await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = GatewayClient::new("http://127.0.0.1:1").unwrap();
        let err = client.create_session().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_mock_gateway_archive_lifecycle() {
        let gateway = MockGateway::accepting();
        let session_id = SessionId::from("1_MX4abc");

        let archive = gateway.start_archive(&session_id).await.unwrap();
        let stopped = gateway.stop_archive(&archive.id).await.unwrap();
        assert_eq!(stopped.status, "stopped");

        let again = gateway.stop_archive(&archive.id).await.unwrap_err();
        assert!(matches!(again, ClientError::Gateway { status: 409, .. }));

        assert_eq!(gateway.started(), vec![session_id]);
        assert_eq!(gateway.stopped().len(), 2);
    }
}
