//! Participant token minting.
//!
//! Tokens are signed locally with the project API secret; the platform is
//! never contacted. That means a token can be minted for any session id,
//! including one that does not exist: the failure is deferred until the
//! browser tries to connect with it.
//!
//! # Format
//!
//! ```text
//! data  = session_id=<sid>&create_time=<unix>&expire_time=<unix>&role=<role>&nonce=<hex>
//!         [&connection_data=<urlencoded>][&initial_layout_class_list=<urlencoded>]
//! sig   = hex(HMAC-SHA1(api_secret, data))
//! token = "T1==" + base64("partner_id=<api_key>&sig=<sig>:" + data)
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use common::secret::{ExposeSecret, SecretString};
use common::types::SessionId;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Prefix of every participant token.
pub const TOKEN_SENTINEL: &str = "T1==";

/// Maximum length of the connection data attached to a token.
pub const MAX_CONNECTION_DATA_LEN: usize = 1000;

/// Longest lifetime a token may be given (30 days).
pub const MAX_TOKEN_LIFETIME_SECONDS: i64 = 2_592_000;

/// Role granted by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenRole {
    /// May only subscribe to streams.
    Subscriber,
    /// May publish and subscribe.
    #[default]
    Publisher,
    /// May additionally force-disconnect and force-unpublish others.
    Moderator,
}

impl TokenRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRole::Subscriber => "subscriber",
            TokenRole::Publisher => "publisher",
            TokenRole::Moderator => "moderator",
        }
    }
}

/// Per-token options.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    pub role: TokenRole,

    /// Absolute expiry (unix seconds). `None` uses the generator's TTL.
    pub expire_time: Option<i64>,

    /// Opaque data delivered to other participants with this connection.
    pub connection_data: Option<String>,

    /// Layout classes applied to streams published with this token.
    pub initial_layout_class_list: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("connection data must be at most 1000 bytes, got {0}")]
    ConnectionDataTooLong(usize),

    #[error("expire time {0} is not within the allowed token lifetime")]
    InvalidExpireTime(i64),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("random number generator failure")]
    Rng,
}

/// A token split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub partner_id: String,
    pub signature: String,
    /// The signed data string, exactly as signed.
    pub data: String,
    /// Decoded `key=value` pairs of `data`, in order.
    pub fields: Vec<(String, String)>,
}

impl DecodedToken {
    /// Look up a decoded data field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Mints participant tokens for one project.
#[derive(Clone)]
pub struct TokenGenerator {
    api_key: String,
    api_secret: SecretString,
    ttl_seconds: i64,
    rng: SystemRandom,
}

impl TokenGenerator {
    pub fn new(api_key: String, api_secret: SecretString, ttl_seconds: u64) -> Self {
        Self {
            api_key,
            api_secret,
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(MAX_TOKEN_LIFETIME_SECONDS),
            rng: SystemRandom::new(),
        }
    }

    /// Mint a token for `session_id` at time `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// - `TokenError::EmptySessionId` for an empty session id
    /// - `TokenError::ConnectionDataTooLong` / `InvalidExpireTime` for bad options
    /// - `TokenError::Rng` if the nonce cannot be generated
    pub fn generate(
        &self,
        session_id: &SessionId,
        options: &TokenOptions,
        now: i64,
    ) -> Result<String, TokenError> {
        if session_id.is_empty() {
            return Err(TokenError::EmptySessionId);
        }

        let expire_time = options.expire_time.unwrap_or(now + self.ttl_seconds);
        if expire_time <= now || expire_time > now + MAX_TOKEN_LIFETIME_SECONDS {
            return Err(TokenError::InvalidExpireTime(expire_time));
        }

        let mut nonce = [0u8; 8];
        self.rng.fill(&mut nonce).map_err(|_| TokenError::Rng)?;

        let mut data = format!(
            "session_id={}&create_time={}&expire_time={}&role={}&nonce={}",
            urlencoding::encode(session_id.as_str()),
            now,
            expire_time,
            options.role.as_str(),
            hex::encode(nonce)
        );

        if let Some(connection_data) = &options.connection_data {
            if connection_data.len() > MAX_CONNECTION_DATA_LEN {
                return Err(TokenError::ConnectionDataTooLong(connection_data.len()));
            }
            data.push_str("&connection_data=");
            data.push_str(&urlencoding::encode(connection_data));
        }

        if !options.initial_layout_class_list.is_empty() {
            data.push_str("&initial_layout_class_list=");
            data.push_str(&urlencoding::encode(
                &options.initial_layout_class_list.join(" "),
            ));
        }

        let signature = self.sign(&data);
        let payload = format!("partner_id={}&sig={}:{}", self.api_key, signature, data);

        Ok(format!("{}{}", TOKEN_SENTINEL, STANDARD.encode(payload)))
    }

    /// Check that a decoded token was signed with this project's secret.
    pub fn verify(&self, token: &DecodedToken) -> bool {
        let Ok(signature) = hex::decode(&token.signature) else {
            return false;
        };
        token.partner_id == self.api_key
            && hmac::verify(&self.key(), token.data.as_bytes(), &signature).is_ok()
    }

    fn key(&self) -> hmac::Key {
        hmac::Key::new(
            hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            self.api_secret.expose_secret().as_bytes(),
        )
    }

    fn sign(&self, data: &str) -> String {
        hex::encode(hmac::sign(&self.key(), data.as_bytes()).as_ref())
    }
}

/// Split a token into partner id, signature and data fields.
pub fn decode_token(token: &str) -> Result<DecodedToken, TokenError> {
    let encoded = token
        .strip_prefix(TOKEN_SENTINEL)
        .ok_or_else(|| TokenError::Malformed("missing T1== prefix".to_string()))?;

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| TokenError::Malformed(format!("invalid base64: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| TokenError::Malformed(format!("invalid utf-8: {e}")))?;

    let (header, data) = decoded
        .split_once(':')
        .ok_or_else(|| TokenError::Malformed("missing data section".to_string()))?;

    let header_fields = parse_pairs(header)?;
    let lookup = |name: &str| {
        header_fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| TokenError::Malformed(format!("missing {name}")))
    };

    Ok(DecodedToken {
        partner_id: lookup("partner_id")?,
        signature: lookup("sig")?,
        data: data.to_string(),
        fields: parse_pairs(data)?,
    })
}

fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, TokenError> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map_err(|e| TokenError::Malformed(format!("invalid encoding for {key}: {e}")))?;
            Ok((key.to_string(), value.into_owned()))
        })
        .collect()
}
