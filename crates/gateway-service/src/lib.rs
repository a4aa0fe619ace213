//! Gateway Service Library
//!
//! HTTP front end for video calls built on a hosted video platform:
//!
//! - Session creation on the platform
//! - Participant token minting with the project credentials
//! - Archive (recording) start, stop and listing
//! - Landing and call pages for the browser client
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> video platform REST API
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Request, response and platform data models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Token minting and the platform client

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
