//! In-process stand-ins used by `DEV_MODE` and `DRY_RUN`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use shortsmith_media::{normalize_short_url, ComposedVideo, DownloadedShort, MediaResult};
use shortsmith_models::{Row, SheetTable};
use shortsmith_youtube::{UploadRequest, UploadedVideo, YoutubeResult};

use crate::error::PipelineResult;
use crate::traits::{LoadedRows, RowSource, ShortDownloader, VideoComposer, VideoUploader};

const DEMO_VIDEO_IDS: &[(&str, &str)] = &[
    ("dQw4w9WgXcQ", "Classic"),
    ("9bZkp7q19f0", "Dance"),
    ("kJQP7kiw5Fk", "Summer"),
];

/// Fixed demo rows, whatever the requested source.
#[derive(Debug, Clone)]
pub struct DemoRowSource {
    url_column: String,
}

impl DemoRowSource {
    pub fn new(url_column: impl Into<String>) -> Self {
        Self {
            url_column: url_column.into(),
        }
    }

    pub fn table(&self) -> SheetTable {
        let rows = DEMO_VIDEO_IDS
            .iter()
            .enumerate()
            .map(|(index, (id, topic))| {
                let mut columns = BTreeMap::new();
                columns.insert(
                    self.url_column.clone(),
                    format!("https://www.youtube.com/shorts/{id}"),
                );
                columns.insert("topic".to_string(), topic.to_string());
                Row::new(index, index + 2, &self.url_column, columns)
            })
            .collect();
        SheetTable {
            headers: vec![self.url_column.clone(), "topic".to_string()],
            rows,
        }
    }
}

#[async_trait]
impl RowSource for DemoRowSource {
    async fn load(&self, source: &str, _worksheet: Option<&str>) -> PipelineResult<LoadedRows> {
        info!(source, "Dev mode: serving demo rows");
        Ok(LoadedRows {
            table: self.table(),
            location: None,
        })
    }
}

/// Hands out `dev-N` video ids without talking to YouTube.
#[derive(Debug, Default)]
pub struct DevUploader {
    uploads: AtomicUsize,
}

impl DevUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoUploader for DevUploader {
    async fn upload(&self, request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            title = %request.title,
            privacy = %request.privacy,
            publish_at = ?request.publish_at,
            "Dev mode: pretending to upload"
        );
        Ok(UploadedVideo {
            id: format!("dev-{n}"),
        })
    }
}

/// Validates the URL and writes a placeholder file instead of running yt-dlp.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderDownloader;

#[async_trait]
impl ShortDownloader for PlaceholderDownloader {
    async fn download(
        &self,
        source_url: &str,
        row_index: usize,
        dest_dir: &Path,
    ) -> MediaResult<DownloadedShort> {
        let (video_id, _) = normalize_short_url(source_url)?;
        let path = dest_dir.join(format!("{video_id}.mp4"));
        tokio::fs::write(&path, video_id.as_bytes()).await?;
        Ok(DownloadedShort {
            path,
            row_index,
            video_id,
        })
    }
}

/// Copies the short to the output instead of running ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct CopyComposer;

#[async_trait]
impl VideoComposer for CopyComposer {
    async fn compose(
        &self,
        short: &DownloadedShort,
        _clip: &Path,
        output: &Path,
    ) -> MediaResult<ComposedVideo> {
        tokio::fs::copy(&short.path, output).await?;
        Ok(ComposedVideo {
            path: output.to_path_buf(),
            duration_secs: 0.0,
        })
    }
}
