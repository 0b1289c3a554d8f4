//! Shared data models for the Shortsmith pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Spreadsheet rows and worksheet tables
//! - Run identifiers, per-row outcomes and run reports
//! - Progress events streamed to the web UI
//! - Title/description templates and the publish-slot scheduler

pub mod event;
pub mod row;
pub mod run;
pub mod schedule;
pub mod template;
pub mod utils;

// Re-export common types
pub use event::RunEvent;
pub use row::{Row, SheetTable, TableError};
pub use run::{RowOutcome, RowReport, RowStage, RunId, RunReport, RunState, SkipReason};
pub use schedule::{check_slot, PrivacyStatus, ScheduleConfig, ScheduleError};
pub use template::{
    MetadataTemplate, RenderContext, RenderedMetadata, TemplateError, TemplateField,
};
pub use utils::{
    extract_playlist_id, extract_spreadsheet_id, extract_youtube_id, shorts_url, YoutubeIdError,
};
