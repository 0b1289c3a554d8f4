//! Axum server for the Shorts repost pipeline.
//!
//! This crate provides:
//! - The web form and run control endpoints
//! - Live run progress over WebSocket
//! - A persisted library of title/description templates
//! - Prometheus metrics and request logging

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod runs;
pub mod state;
pub mod templates;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use runs::{RunHandle, RunRegistry};
pub use state::AppState;
pub use templates::{NamedTemplate, TemplateStore};
