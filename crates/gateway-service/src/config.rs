//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. The API secret is
//! held in a [`SecretString`] and redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default listen host.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default video platform REST base URL.
pub const DEFAULT_VIDEO_API_URL: &str = "https://api.opentok.com";

/// Default directory for static pages and assets.
pub const DEFAULT_PUBLIC_DIR: &str = "public";

/// Default participant token lifetime (one day).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 86_400;

/// Longest token lifetime the platform accepts (30 days).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 2_592_000;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Longest shutdown drain period (five minutes).
pub const MAX_DRAIN_SECONDS: u64 = 300;

/// Gateway configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Video platform project API key. Returned to browsers with credentials.
    pub api_key: String,

    /// Video platform API secret, used for token and REST JWT signing.
    pub api_secret: SecretString,

    /// Listen host (default: "0.0.0.0").
    pub bind_host: String,

    /// Listen port (default: 3000).
    pub port: u16,

    /// Base URL of the video platform REST API.
    pub video_api_url: String,

    /// Directory holding `index.html`, `call.html` and static assets.
    pub public_dir: PathBuf,

    /// Lifetime of minted participant tokens in seconds.
    pub token_ttl_seconds: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Seconds to keep serving after a shutdown signal (default: 0).
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts the API secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("bind_host", &self.bind_host)
            .field("port", &self.port)
            .field("video_api_url", &self.video_api_url)
            .field("public_dir", &self.public_dir)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port configuration: {0}")]
    InvalidPort(String),

    #[error("Invalid token TTL configuration: {0}")]
    InvalidTokenTtl(String),

    #[error("Invalid request timeout configuration: {0}")]
    InvalidRequestTimeout(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrain(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = required(vars, "API_KEY")?;
        let api_secret = SecretString::from(required(vars, "API_SECRET")?);

        let bind_host = vars
            .get("BIND_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        // Lowercase `port` is the historical name; `PORT` is accepted as well.
        let port = match vars.get("port").or_else(|| vars.get("PORT")) {
            Some(value_str) => value_str.parse::<u16>().map_err(|e| {
                ConfigError::InvalidPort(format!(
                    "port must be an integer between 0 and 65535, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_PORT,
        };

        let video_api_url = vars
            .get("VIDEO_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_VIDEO_API_URL.to_string());

        let public_dir = vars
            .get("PUBLIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR));

        let token_ttl_seconds = if let Some(value_str) = vars.get("TOKEN_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTokenTtl(format!(
                    "TOKEN_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTokenTtl(
                    "TOKEN_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_TOKEN_TTL_SECONDS {
                return Err(ConfigError::InvalidTokenTtl(format!(
                    "TOKEN_TTL_SECONDS must not exceed {} seconds, got {}",
                    MAX_TOKEN_TTL_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_TOKEN_TTL_SECONDS
        };

        let request_timeout_seconds =
            if let Some(value_str) = vars.get("REQUEST_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidRequestTimeout(format!(
                        "REQUEST_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidRequestTimeout(
                        "REQUEST_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_REQUEST_TIMEOUT_SECONDS
            };

        let drain_seconds = match vars.get("GW_DRAIN_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidDrain(format!(
                        "GW_DRAIN_SECONDS must be a non-negative integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value > MAX_DRAIN_SECONDS {
                    return Err(ConfigError::InvalidDrain(format!(
                        "GW_DRAIN_SECONDS must not exceed {} seconds, got {}",
                        MAX_DRAIN_SECONDS, value
                    )));
                }

                value
            }
            None => 0,
        };

        Ok(Config {
            api_key,
            api_secret,
            bind_host,
            port,
            video_api_url,
            public_dir,
            token_ttl_seconds,
            request_timeout_seconds,
            drain_seconds,
        })
    }

    /// Address the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}
