//! Google Sheets v4 REST client.
//!
//! Reads the rows that drive a run and optionally writes per-row results back:
//! - Service account authentication via gcp_auth
//! - Token caching with refresh margin
//! - Exponential backoff with jitter for transient failures
//! - Request metrics

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod token_cache;

pub use client::{column_letter, SheetData, SheetsClient, SheetsConfig, StatusUpdate};
pub use error::{SheetsError, SheetsResult};
pub use retry::RetryConfig;
pub use token_cache::{AccessTokenSource, StaticToken, TokenCache};
