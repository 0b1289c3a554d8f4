//! Pipeline error types.
//!
//! [`PipelineError`] aborts a run before any row is processed.
//! [`RowError`] fails a single row; the run carries on unless
//! [`RowError::halt_reason`] says no later upload can succeed.

use thiserror::Error;

use shortsmith_media::MediaError;
use shortsmith_models::{RowStage, ScheduleError, SkipReason, TemplateError};
use shortsmith_sheets::SheetsError;
use shortsmith_youtube::YoutubeError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("YouTube credentials rejected: {0}")]
    Youtube(#[from] YoutubeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn playlist(msg: impl Into<String>) -> Self {
        Self::Playlist(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Short machine-readable category for logs and the UI.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Sheets(SheetsError::Auth(_)) => "auth",
            PipelineError::Sheets(SheetsError::NotFound(_)) => "not_found",
            PipelineError::Sheets(SheetsError::Schema(_)) | PipelineError::Schema(_) => "schema",
            PipelineError::Sheets(_) | PipelineError::Playlist(_) => "source",
            PipelineError::Template(_) => "template",
            PipelineError::Youtube(_) => "auth",
            PipelineError::Io(_) => "io",
        }
    }
}

/// Failure of one row, tagged with the stage it happened in.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{0}")]
    Schedule(#[from] ScheduleError),

    #[error("{0}")]
    Render(#[from] TemplateError),

    #[error("{}", .0.detail())]
    Download(MediaError),

    #[error("{}", .0.detail())]
    Compose(MediaError),

    #[error("{0}")]
    Upload(#[from] YoutubeError),

    #[error("scratch directory: {0}")]
    Scratch(std::io::Error),
}

impl RowError {
    pub fn stage(&self) -> RowStage {
        match self {
            RowError::Schedule(_) => RowStage::Schedule,
            RowError::Render(_) => RowStage::Render,
            RowError::Download(_) | RowError::Scratch(_) => RowStage::Download,
            RowError::Compose(_) => RowStage::Compose,
            RowError::Upload(_) => RowStage::Upload,
        }
    }

    /// Why every later row must be skipped, if this failure means no upload can succeed.
    pub fn halt_reason(&self) -> Option<SkipReason> {
        match self {
            RowError::Upload(YoutubeError::QuotaExceeded(_)) => Some(SkipReason::QuotaExceeded),
            RowError::Upload(YoutubeError::Auth(_)) => Some(SkipReason::UploaderUnauthorized),
            _ => None,
        }
    }
}
