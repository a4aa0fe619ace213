//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use gateway_service::config::Config;
use gateway_service::routes::{self, AppState};
use gateway_service::services::{VideoApi, VideoApiClient};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// API key configured on every test server.
pub const TEST_API_KEY: &str = "46000001";

/// API secret configured on every test server.
pub const TEST_API_SECRET: &str = "test-api-secret-0123456789abcdef";

/// Body of the landing page written to the scratch public directory.
pub const TEST_LANDING_HTML: &str = "<html><body>landing</body></html>";

/// Body of the call page written to the scratch public directory.
pub const TEST_CALL_HTML: &str = "<html><body>call</body></html>";

/// Test harness for spawning the gateway in E2E tests.
///
/// Each server gets its own scratch public directory holding `index.html`
/// and `call.html`, removed when the server is dropped.
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    _public_dir: TempDir,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a server backed by the given platform client.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn(video_api: Arc<dyn VideoApi>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(video_api, HashMap::new()).await
    }

    /// Spawn a server whose real platform client talks to `upstream_url`
    /// (typically a wiremock server).
    pub async fn spawn_with_upstream(upstream_url: &str) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([("VIDEO_API_URL".to_string(), upstream_url.to_string())]);
        let config = Self::build_config(&vars, std::path::Path::new("."))?;

        let client = VideoApiClient::new(
            config.video_api_url.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create video platform client: {}", e))?;

        Self::spawn_with_vars(Arc::new(client), vars).await
    }

    /// Spawn a server with extra environment overrides.
    pub async fn spawn_with_vars(
        video_api: Arc<dyn VideoApi>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let public_dir = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("Failed to create public dir: {}", e))?;
        std::fs::write(public_dir.path().join("index.html"), TEST_LANDING_HTML)?;
        std::fs::write(public_dir.path().join("call.html"), TEST_CALL_HTML)?;

        let config = Self::build_config(&overrides, public_dir.path())?;

        let state = Arc::new(AppState::new(config.clone(), video_api));

        // Built but not installed: several servers can share one process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _public_dir: public_dir,
            _handle: handle,
        })
    }

    fn build_config(
        overrides: &HashMap<String, String>,
        public_dir: &std::path::Path,
    ) -> Result<Config, anyhow::Error> {
        let mut vars = HashMap::from([
            ("API_KEY".to_string(), TEST_API_KEY.to_string()),
            ("API_SECRET".to_string(), TEST_API_SECRET.to_string()),
            ("BIND_HOST".to_string(), "127.0.0.1".to_string()),
            ("port".to_string(), "0".to_string()),
            (
                "PUBLIC_DIR".to_string(),
                public_dir.to_string_lossy().to_string(),
            ),
        ]);
        vars.extend(overrides.clone());

        Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
