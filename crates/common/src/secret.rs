//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. The gateway holds the video
//! platform API secret in a [`SecretString`]; anything deriving `Debug` over
//! it prints a redacted placeholder instead of the value.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ProjectCredentials {
//!     api_key: String,
//!     api_secret: SecretString,
//! }
//!
//! let creds = ProjectCredentials {
//!     api_key: "46000001".to_string(),
//!     api_secret: SecretString::from("0123456789abcdef"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("0123456789abcdef"));
//! assert_eq!(creds.api_secret.expose_secret(), "0123456789abcdef");
//! ```
//!
//! Use `SecretString` for API secrets, signing keys and bearer material.
//! Participant tokens are short-lived and handed to browsers, so they stay
//! plain `String`s but are never logged.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("api-secret-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("api-secret-value"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("signing-key");
        assert_eq!(secret.expose_secret(), "signing-key");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct ProjectCredentials {
            api_key: String,
            api_secret: SecretString,
        }

        let creds = ProjectCredentials {
            api_key: "46000001".to_string(),
            api_secret: SecretString::from("super-secret"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("46000001"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ProjectCredentials {
            api_key: String,
            api_secret: SecretString,
        }

        let json = r#"{"api_key": "46000001", "api_secret": "my-secret-value"}"#;
        let creds: ProjectCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.api_secret.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
    }
}
