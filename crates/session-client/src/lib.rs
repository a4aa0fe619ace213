//! Session Client Library
//!
//! Browser-side logic of a video call, expressed against typed interfaces so
//! it runs and tests without a browser or the vendor SDK:
//!
//! - `preselection` - device choice and preview before joining
//! - `controller` - per-tab session lifecycle, UI commands and SDK events
//! - `chat` - text chat over the session's signal channel
//! - `layout` - tile geometry for publishers and subscribers
//! - `preferences` - persisted device choices
//! - `gateway` - HTTP client for the gateway service
//! - `sdk` - traits and events at the vendor SDK seam
//!
//! # Architecture
//!
//! ```text
//! preselection -> (preferences) -> controller -> gateway (HTTP)
//!                                      |
//!                                      +-> sdk (media + signal events) -> layout, chat
//! ```

pub mod chat;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod layout;
pub mod preferences;
pub mod preselection;
pub mod sdk;

pub use errors::ClientError;
