//! Client error types.
//!
//! Screen-share and validation errors carry the text the page shows in an
//! alert. Nothing here is retried: a failed call leaves the controller where
//! it was and the caller decides what to show.

use crate::controller::ControllerState;
use crate::preferences::PreferencesError;
use crate::sdk::SdkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The gateway answered with a non-success status.
    #[error("Gateway returned status {status}")]
    Gateway { status: u16, body: String },

    /// The gateway could not be reached.
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    /// A gateway success response could not be decoded.
    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    #[error("Video platform error: {0}")]
    Sdk(#[from] SdkError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error("screen share not supported by browser")]
    ScreenShareUnsupported,

    #[error("install the extension")]
    ScreenShareExtensionMissing,

    #[error("screen is being shared")]
    ScreenShareInProgress,

    #[error("Recording is not enabled for this call")]
    RecordingDisabled,

    #[error("Not a supported browser")]
    UnsupportedBrowser,

    /// User input rejected before any call was made.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid session URL: {0}")]
    InvalidUrl(String),

    #[error("Operation requires state {expected:?}, controller is {actual:?}")]
    InvalidState {
        expected: ControllerState,
        actual: ControllerState,
    },

    #[error("Session controller is no longer running")]
    ControllerClosed,
}

impl ClientError {
    /// Whether the page reports this error with a blocking alert.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            ClientError::ScreenShareUnsupported
                | ClientError::ScreenShareExtensionMissing
                | ClientError::ScreenShareInProgress
                | ClientError::UnsupportedBrowser
                | ClientError::Validation(_)
        )
    }
}
