//! Axum HTTP API for the video violence scanner.
//!
//! This crate provides:
//! - REST endpoints to start, poll, stop, list and delete analyses
//! - Health and Prometheus metrics endpoints
//! - Request id, logging and security header middleware

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
