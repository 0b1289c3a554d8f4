//! Seams between the run loop and the outside world.

use std::path::Path;

use async_trait::async_trait;

use shortsmith_media::{ComposedVideo, DownloadedShort, MediaResult};
use shortsmith_models::{RowReport, SheetTable};
use shortsmith_youtube::{UploadRequest, UploadedVideo, YoutubeResult};

use crate::error::PipelineResult;

/// Where a table of rows came from, for write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLocation {
    pub spreadsheet_id: String,
    pub worksheet: String,
}

/// Rows for one run.
#[derive(Debug, Clone)]
pub struct LoadedRows {
    pub table: SheetTable,
    /// Set when the rows came from a spreadsheet
    pub location: Option<SheetLocation>,
}

/// Produces the rows of a run.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// `source` is a spreadsheet URL/id or a YouTube playlist/video URL.
    async fn load(&self, source: &str, worksheet: Option<&str>) -> PipelineResult<LoadedRows>;

    /// Record per-row results next to the rows. Sources without a writable
    /// backing store do nothing.
    async fn write_back(&self, _rows: &LoadedRows, _reports: &[RowReport]) -> PipelineResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ShortDownloader: Send + Sync {
    async fn download(
        &self,
        source_url: &str,
        row_index: usize,
        dest_dir: &Path,
    ) -> MediaResult<DownloadedShort>;
}

#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Write `short` followed by `clip` to `output`.
    async fn compose(
        &self,
        short: &DownloadedShort,
        clip: &Path,
        output: &Path,
    ) -> MediaResult<ComposedVideo>;
}

#[async_trait]
pub trait VideoUploader: Send + Sync {
    /// Fail fast on credentials that cannot upload before any row runs.
    async fn verify(&self) -> YoutubeResult<()> {
        Ok(())
    }

    async fn upload(&self, request: &UploadRequest) -> YoutubeResult<UploadedVideo>;
}
