//! Common utilities and types shared across Huddle components.

#![warn(clippy::pedantic)]

/// Module for identifier types shared by the gateway and the session client
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
