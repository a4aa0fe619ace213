//! # Gateway Test Utilities
//!
//! Shared test utilities for the gateway service.
//!
//! This crate provides:
//! - Server test harness (`TestGatewayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//! use gateway_service::services::MockVideoApi;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestGatewayServer::spawn(Arc::new(MockVideoApi::accepting())).await?;
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/api/create", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
