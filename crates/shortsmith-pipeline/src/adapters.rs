//! Pipeline seams implemented by the real clients.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tracing::debug;

use shortsmith_media::{
    ClipComposer, ComposeConfig, ComposedVideo, DownloadedShort, MediaResult, YtDlpDownloader,
};
use shortsmith_models::{RowOutcome, RowReport};
use shortsmith_sheets::{SheetsClient, SheetsError, StatusUpdate};
use shortsmith_youtube::{UploadRequest, UploadedVideo, YoutubeError, YoutubeResult, YoutubeUploader};

use crate::error::{PipelineError, PipelineResult};
use crate::playlist::is_youtube_source;
use crate::traits::{
    LoadedRows, RowSource, SheetLocation, ShortDownloader, VideoComposer, VideoUploader,
};

/// Rows from a Google spreadsheet, with optional status write-back.
pub struct SheetRowSource {
    client: SheetsClient,
}

impl SheetRowSource {
    pub fn new(client: SheetsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RowSource for SheetRowSource {
    async fn load(&self, source: &str, worksheet: Option<&str>) -> PipelineResult<LoadedRows> {
        let data = self.client.read_table(source, worksheet).await?;
        Ok(LoadedRows {
            table: data.table,
            location: Some(SheetLocation {
                spreadsheet_id: data.spreadsheet_id,
                worksheet: data.worksheet,
            }),
        })
    }

    async fn write_back(&self, rows: &LoadedRows, reports: &[RowReport]) -> PipelineResult<()> {
        let Some(status_column) = self.client.config().status_column.as_deref() else {
            return Ok(());
        };
        let Some(location) = rows.location.as_ref() else {
            return Ok(());
        };
        let column = rows.table.column_index(status_column).ok_or_else(|| {
            PipelineError::schema(format!("status column '{status_column}' not found"))
        })?;

        let updates: Vec<StatusUpdate> = reports
            .iter()
            .map(|r| StatusUpdate {
                line: r.line,
                value: status_text(&r.outcome),
            })
            .collect();

        self.client
            .write_statuses(&location.spreadsheet_id, &location.worksheet, column, &updates)
            .await?;
        Ok(())
    }
}

/// Text written into the status column for one row.
pub fn status_text(outcome: &RowOutcome) -> String {
    match outcome {
        RowOutcome::Uploaded {
            video_id,
            publish_at: Some(at),
        } => format!(
            "uploaded {video_id} for {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        RowOutcome::Uploaded { video_id, .. } => format!("uploaded {video_id}"),
        RowOutcome::Failed { stage, error } => format!("failed at {stage}: {error}"),
        RowOutcome::Skipped { reason } => format!("skipped: {}", reason.as_str()),
    }
}

/// Sends YouTube URLs to the playlist source and everything else to the spreadsheet source.
pub struct SourceRouter {
    sheets: Arc<dyn RowSource>,
    youtube: Arc<dyn RowSource>,
}

impl SourceRouter {
    pub fn new(sheets: Arc<dyn RowSource>, youtube: Arc<dyn RowSource>) -> Self {
        Self { sheets, youtube }
    }

    fn pick(&self, source: &str) -> &Arc<dyn RowSource> {
        if is_youtube_source(source) {
            &self.youtube
        } else {
            &self.sheets
        }
    }
}

#[async_trait]
impl RowSource for SourceRouter {
    async fn load(&self, source: &str, worksheet: Option<&str>) -> PipelineResult<LoadedRows> {
        self.pick(source).load(source, worksheet).await
    }

    async fn write_back(&self, rows: &LoadedRows, reports: &[RowReport]) -> PipelineResult<()> {
        if rows.location.is_some() {
            self.sheets.write_back(rows, reports).await
        } else {
            Ok(())
        }
    }
}

/// Stands in for a spreadsheet source whose credentials failed to load.
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RowSource for UnavailableSource {
    async fn load(&self, _source: &str, _worksheet: Option<&str>) -> PipelineResult<LoadedRows> {
        Err(PipelineError::Sheets(SheetsError::auth(self.reason.clone())))
    }
}

#[async_trait]
impl ShortDownloader for YtDlpDownloader {
    async fn download(
        &self,
        source_url: &str,
        row_index: usize,
        dest_dir: &Path,
    ) -> MediaResult<DownloadedShort> {
        YtDlpDownloader::download(self, source_url, row_index, dest_dir).await
    }
}

/// ffmpeg concat with a per-run appended clip.
#[derive(Debug, Clone, Default)]
pub struct FfmpegComposer {
    config: ComposeConfig,
}

impl FfmpegComposer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VideoComposer for FfmpegComposer {
    async fn compose(
        &self,
        short: &DownloadedShort,
        clip: &Path,
        output: &Path,
    ) -> MediaResult<ComposedVideo> {
        ClipComposer::new(clip, self.config.clone())
            .compose(short, output)
            .await
    }
}

#[async_trait]
impl VideoUploader for YoutubeUploader {
    async fn verify(&self) -> YoutubeResult<()> {
        self.verify_credentials().await
    }

    async fn upload(&self, request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        YoutubeUploader::upload(self, request).await
    }
}

/// Stands in for an uploader whose client secrets failed to load.
pub struct UnavailableUploader {
    reason: String,
}

impl UnavailableUploader {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl VideoUploader for UnavailableUploader {
    async fn verify(&self) -> YoutubeResult<()> {
        Err(YoutubeError::auth(self.reason.clone()))
    }

    async fn upload(&self, _request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        debug!("Upload attempted without usable credentials");
        Err(YoutubeError::auth(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shortsmith_models::{RowStage, SkipReason};

    #[test]
    fn test_status_text() {
        let at = Utc.with_ymd_and_hms(2026, 11, 1, 9, 0, 0).unwrap();
        assert_eq!(
            status_text(&RowOutcome::Uploaded {
                video_id: "abc".into(),
                publish_at: Some(at)
            }),
            "uploaded abc for 2026-11-01T09:00:00Z"
        );
        assert_eq!(
            status_text(&RowOutcome::Failed {
                stage: RowStage::Download,
                error: "Video unavailable".into()
            }),
            "failed at download: Video unavailable"
        );
        assert_eq!(
            status_text(&RowOutcome::Skipped {
                reason: SkipReason::QuotaExceeded
            }),
            "skipped: quota_exceeded"
        );
    }

    #[tokio::test]
    async fn test_unavailable_source_is_auth_error() {
        let source = UnavailableSource::new("credentials.json not found");
        let err = source.load("anything", None).await.unwrap_err();
        assert_eq!(err.kind(), "auth");
    }
}
