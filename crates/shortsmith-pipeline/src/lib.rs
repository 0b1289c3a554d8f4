//! Shorts repost pipeline.
//!
//! This crate provides:
//! - The per-row run loop with error isolation and stop handling
//! - Row sources for spreadsheets and YouTube playlists
//! - Adapters over the media, Sheets and YouTube clients
//! - Dev-mode and dry-run stand-ins

pub mod adapters;
pub mod config;
pub mod dev;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod playlist;
pub mod processor;
pub mod traits;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, RowError};
pub use logging::RunLogger;
pub use processor::{Pipeline, RunControl, RunRequest};
pub use traits::{LoadedRows, RowSource, SheetLocation, ShortDownloader, VideoComposer, VideoUploader};
