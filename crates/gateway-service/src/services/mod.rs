//! Service layer for the gateway.
//!
//! # Components
//!
//! - `project_auth` - Project JWTs authenticating REST calls to the video platform
//! - `token_generator` - Local minting of participant tokens
//! - `video_api` - REST client for session creation and archiving

pub mod project_auth;
pub mod token_generator;
pub mod video_api;

pub use token_generator::{TokenGenerator, TokenOptions, TokenRole};
pub use video_api::mock::MockVideoApi;
pub use video_api::{VideoApi, VideoApiClient, VideoApiError};
