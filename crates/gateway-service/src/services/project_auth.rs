//! Project-level JWTs for authenticating REST calls to the video platform.
//!
//! Every REST request carries `X-OPENTOK-AUTH: <jwt>` where the JWT is
//! HS256-signed with the project's API secret and identifies the project
//! (`ist: "project"`) by its API key.

use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the project JWT.
pub const AUTH_HEADER: &str = "X-OPENTOK-AUTH";

/// Lifetime of a project JWT. Each request mints a fresh one.
pub const PROJECT_JWT_TTL_SECONDS: i64 = 300;

/// Claims of a project JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectClaims {
    /// Issuer: the project API key.
    pub iss: String,
    /// Issuer type, always "project".
    pub ist: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Sign a project JWT valid from `now` (unix seconds).
pub fn project_jwt(
    api_key: &str,
    api_secret: &SecretString,
    now: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = ProjectClaims {
        iss: api_key.to_string(),
        ist: "project".to_string(),
        iat: now,
        exp: now + PROJECT_JWT_TTL_SECONDS,
        jti: Uuid::new_v4().to_string(),
    };

    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());

    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(api_secret.expose_secret().as_bytes()),
    )
}
