//! Web server module: the SNS webhook route and a health check.
//!
//! Handlers stay thin; all decisions are made by the
//! [`Processor`](crate::processor::Processor).

pub mod handlers;

pub use handlers::{build_router, health, sns_endpoint, AppState, HealthResponse};
