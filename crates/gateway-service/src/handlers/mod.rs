//! HTTP request handlers for the gateway.

pub mod archives;
pub mod health;
pub mod metrics;
pub mod pages;
pub mod sessions;

pub use archives::{list_archives, start_archive, stop_archive};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use pages::{call_page, landing_page};
pub use sessions::{create_session, issue_credentials};
