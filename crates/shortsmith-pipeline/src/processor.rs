//! Run orchestration.
//!
//! Rows are processed one at a time: schedule, render, download, compose,
//! upload. A failing row is recorded and the run moves on; quota exhaustion
//! or lost upload authorization skips every remaining row.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{warn, Instrument};

use shortsmith_media::{ComposeConfig, DownloadConfig, YtDlpDownloader};
use shortsmith_models::{
    check_slot, MetadataTemplate, PrivacyStatus, RenderContext, RenderedMetadata, Row, RowOutcome,
    RowReport, RowStage, RunEvent, RunReport, RunState, ScheduleConfig, SkipReason,
};
use shortsmith_sheets::{SheetsClient, SheetsConfig};
use shortsmith_youtube::{UploadRequest, YoutubeConfig, YoutubeUploader};

use crate::adapters::{
    FfmpegComposer, SheetRowSource, SourceRouter, UnavailableSource, UnavailableUploader,
};
use crate::config::PipelineConfig;
use crate::dev::{CopyComposer, DemoRowSource, DevUploader, PlaceholderDownloader};
use crate::error::{PipelineError, PipelineResult, RowError};
use crate::logging::RunLogger;
use crate::metrics::{record_row, record_run};
use crate::playlist::PlaylistSource;
use crate::traits::{LoadedRows, RowSource, ShortDownloader, VideoComposer, VideoUploader};

/// Everything the user submitted for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Spreadsheet URL/id, or a YouTube playlist/video URL
    pub source: String,
    pub worksheet: Option<String>,
    /// Clip appended to every short
    pub clip_path: PathBuf,
    pub template: MetadataTemplate,
    pub starting_number: u64,
    pub privacy: PrivacyStatus,
    /// Required for [`PrivacyStatus::Scheduled`]
    pub schedule: Option<ScheduleConfig>,
}

impl RunRequest {
    /// Checks that need no I/O.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.source.trim().is_empty() {
            return Err(PipelineError::invalid_request("source URL is required"));
        }
        if self.privacy.is_scheduled() && self.schedule.is_none() {
            return Err(PipelineError::invalid_request(
                "scheduled privacy needs a schedule start and interval",
            ));
        }
        self.template.placeholders()?;
        Ok(())
    }
}

/// Channels shared between a running pipeline and whoever observes it.
#[derive(Clone)]
pub struct RunControl {
    pub events: broadcast::Sender<RunEvent>,
    /// Flips to `true` when a stop is requested; honored between rows
    pub stop: watch::Receiver<bool>,
    pub report: Arc<RwLock<RunReport>>,
}

impl RunControl {
    fn emit(&self, event: RunEvent) {
        // No subscribers is fine; the report still records everything
        let _ = self.events.send(event);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Runs rows through the download/compose/upload stages.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn RowSource>,
    downloader: Arc<dyn ShortDownloader>,
    composer: Arc<dyn VideoComposer>,
    uploader: Arc<dyn VideoUploader>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn RowSource>,
        downloader: Arc<dyn ShortDownloader>,
        composer: Arc<dyn VideoComposer>,
        uploader: Arc<dyn VideoUploader>,
    ) -> Self {
        Self {
            config,
            source,
            downloader,
            composer,
            uploader,
        }
    }

    /// Wire up the real clients, or the dev/dry-run stand-ins when enabled.
    ///
    /// Credential files are read here, once. A file that fails to load does
    /// not stop the server; runs fail at setup with an auth error instead.
    pub fn build(
        config: PipelineConfig,
        sheets: SheetsConfig,
        youtube: YoutubeConfig,
        download: DownloadConfig,
        compose: ComposeConfig,
    ) -> PipelineResult<Self> {
        let url_column = sheets.url_column.clone();

        let (source, uploader): (Arc<dyn RowSource>, Arc<dyn VideoUploader>) = if config.dev_mode {
            warn!("DEV_MODE enabled: Sheets and YouTube are replaced by in-process fakes");
            (
                Arc::new(DemoRowSource::new(url_column)),
                Arc::new(DevUploader::new()),
            )
        } else {
            let sheets_source: Arc<dyn RowSource> = match SheetsClient::new(sheets) {
                Ok(client) => Arc::new(SheetRowSource::new(client)),
                Err(e) => {
                    warn!("Sheets credentials unavailable: {}", e);
                    Arc::new(UnavailableSource::new(e.to_string()))
                }
            };
            let uploader: Arc<dyn VideoUploader> = match YoutubeUploader::new(youtube) {
                Ok(uploader) => Arc::new(uploader),
                Err(e) => {
                    warn!("YouTube credentials unavailable: {}", e);
                    Arc::new(UnavailableUploader::new(e.to_string()))
                }
            };
            let playlist: Arc<dyn RowSource> = Arc::new(PlaylistSource::new(url_column)?);
            (
                Arc::new(SourceRouter::new(sheets_source, playlist)),
                uploader,
            )
        };

        let (downloader, composer): (Arc<dyn ShortDownloader>, Arc<dyn VideoComposer>) =
            if config.dry_run {
                warn!("DRY_RUN enabled: yt-dlp and ffmpeg are not invoked");
                (Arc::new(PlaceholderDownloader), Arc::new(CopyComposer))
            } else {
                (
                    Arc::new(YtDlpDownloader::new(download)),
                    Arc::new(FfmpegComposer::new(compose)),
                )
            };

        Ok(Self::new(config, source, downloader, composer, uploader))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute a run to completion and return its final report.
    ///
    /// Never fails: setup errors move the report to [`RunState::Error`].
    pub async fn run(&self, request: RunRequest, control: RunControl) -> RunReport {
        let run_id = control.report.read().await.run_id.clone();
        let logger = RunLogger::new(&run_id);
        let span = logger.create_span();

        async {
            {
                let mut report = control.report.write().await;
                report.state = RunState::Processing;
            }
            logger.log_start(&request.source);
            control.emit(RunEvent::log(format!("Reading rows from {}", request.source)));

            let loaded = match self.prepare(&request).await {
                Ok(loaded) => loaded,
                Err(e) => return self.fail(&control, &logger, e).await,
            };

            self.process_rows(&request, &loaded, &control, &logger).await;

            let reports = control.report.read().await.rows.clone();
            if let Err(e) = self.source.write_back(&loaded, &reports).await {
                logger.log_warning(&format!("status write-back failed: {e}"));
                control.emit(RunEvent::log(format!("Status write-back failed: {e}")));
            }

            self.finish(&control, &logger).await
        }
        .instrument(span)
        .await
    }

    /// Setup: everything that must succeed before the first row.
    async fn prepare(&self, request: &RunRequest) -> PipelineResult<LoadedRows> {
        request.validate()?;
        if let Some(schedule) = &request.schedule {
            schedule
                .check_interval(self.config.schedule_horizon())
                .map_err(|e| PipelineError::invalid_request(e.to_string()))?;
        }

        if !tokio::fs::try_exists(&request.clip_path).await? {
            return Err(PipelineError::invalid_request(format!(
                "clip {} does not exist",
                request.clip_path.display()
            )));
        }
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let loaded = self
            .source
            .load(&request.source, request.worksheet.as_deref())
            .await?;
        request.template.validate(&loaded.table.headers)?;
        self.uploader.verify().await?;
        Ok(loaded)
    }

    async fn process_rows(
        &self,
        request: &RunRequest,
        loaded: &LoadedRows,
        control: &RunControl,
        logger: &RunLogger,
    ) {
        let rows: Vec<&Row> = loaded.table.rows.iter().filter(|r| r.has_source()).collect();
        let total = rows.len();
        control.report.write().await.total_rows = Some(total);
        control.emit(RunEvent::log(format!("Processing {total} rows")));

        let mut halt: Option<SkipReason> = None;

        for (position, row) in rows.into_iter().enumerate() {
            if halt.is_none() && control.stop_requested() {
                logger.log_warning("stop requested, skipping remaining rows");
                control.emit(RunEvent::log("Stop requested; remaining rows skipped"));
                halt = Some(SkipReason::Stopped);
            }

            let started = Instant::now();
            let report = match halt {
                Some(reason) => skipped(row, reason),
                None => {
                    control.emit(RunEvent::RowStarted {
                        index: row.index,
                        position: position + 1,
                        total,
                        source_url: row.source_url.clone(),
                    });
                    let (report, halt_reason) = self
                        .process_row(request, row, position, control, &logger.for_row(row.index))
                        .await;
                    if let Some(reason) = halt_reason {
                        logger.log_warning(&format!(
                            "uploads halted ({}), skipping remaining rows",
                            reason.as_str()
                        ));
                        control.emit(RunEvent::log(format!(
                            "Uploads halted: {}",
                            reason.as_str()
                        )));
                        halt = Some(reason);
                    }
                    report
                }
            };

            let duration = (!matches!(report.outcome, RowOutcome::Skipped { .. }))
                .then(|| started.elapsed().as_secs_f64());
            record_row(report.outcome.label(), duration);

            control.report.write().await.rows.push(report.clone());
            control.emit(RunEvent::RowFinished { report });
        }
    }

    /// Run one row through every stage; never fails, the error becomes the outcome.
    async fn process_row(
        &self,
        request: &RunRequest,
        row: &Row,
        position: usize,
        control: &RunControl,
        logger: &RunLogger,
    ) -> (RowReport, Option<SkipReason>) {
        let mut title = None;
        let result = self
            .run_stages(request, row, position, control, logger, &mut title)
            .await;

        let (outcome, halt) = match result {
            Ok((video_id, publish_at)) => {
                logger.log_completion(&format!("uploaded {video_id}"));
                (
                    RowOutcome::Uploaded {
                        video_id,
                        publish_at,
                    },
                    None,
                )
            }
            Err(e) => {
                logger.log_error(&format!("{} failed: {}", e.stage(), e));
                (
                    RowOutcome::Failed {
                        stage: e.stage(),
                        error: e.to_string(),
                    },
                    e.halt_reason(),
                )
            }
        };

        let report = RowReport {
            index: row.index,
            line: row.line,
            source_url: row.source_url.clone(),
            title,
            outcome,
        };
        (report, halt)
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        row: &Row,
        position: usize,
        control: &RunControl,
        logger: &RunLogger,
        title: &mut Option<String>,
    ) -> Result<(String, Option<DateTime<Utc>>), RowError> {
        let stage = |stage: RowStage| {
            control.emit(RunEvent::RowStage {
                index: row.index,
                stage,
            })
        };

        stage(RowStage::Schedule);
        let publish_at = match (request.privacy, request.schedule) {
            (PrivacyStatus::Scheduled, Some(schedule)) => {
                let slot = schedule.slot(position)?;
                check_slot(slot, Utc::now(), self.config.schedule_horizon())?;
                Some(slot)
            }
            _ => None,
        };

        stage(RowStage::Render);
        let number = request.starting_number + position as u64;
        let metadata = request.template.render(&RenderContext::new(row, number))?;
        *title = Some(metadata.title.clone());

        let scratch = tempfile::Builder::new()
            .prefix(&format!("row-{}-", row.index))
            .tempdir_in(&self.config.work_dir)
            .map_err(RowError::Scratch)?;

        let result = self
            .media_and_upload(request, row, scratch.path(), metadata, publish_at, &stage)
            .await;

        if result.is_err() && self.config.keep_failed_artifacts {
            let kept = scratch.keep();
            logger.log_warning(&format!("kept scratch directory {}", kept.display()));
        } else if let Err(e) = scratch.close() {
            logger.log_warning(&format!("failed to remove scratch directory: {e}"));
        }

        result.map(|video_id| (video_id, publish_at))
    }

    async fn media_and_upload(
        &self,
        request: &RunRequest,
        row: &Row,
        scratch: &Path,
        metadata: RenderedMetadata,
        publish_at: Option<DateTime<Utc>>,
        stage: &(dyn Fn(RowStage) + Send + Sync),
    ) -> Result<String, RowError> {
        stage(RowStage::Download);
        let short = self
            .downloader
            .download(&row.source_url, row.index, scratch)
            .await
            .map_err(RowError::Download)?;

        stage(RowStage::Compose);
        let output = scratch.join("composed.mp4");
        let composed = self
            .composer
            .compose(&short, &request.clip_path, &output)
            .await
            .map_err(RowError::Compose)?;

        stage(RowStage::Upload);
        let upload = UploadRequest {
            path: composed.path,
            title: metadata.title,
            description: metadata.description,
            privacy: request.privacy,
            publish_at,
        };
        let video = self.uploader.upload(&upload).await?;
        Ok(video.id)
    }

    async fn fail(&self, control: &RunControl, logger: &RunLogger, error: PipelineError) -> RunReport {
        logger.log_error(&format!("{} ({})", error, error.kind()));
        record_run(RunState::Error.as_str());

        let report = {
            let mut report = control.report.write().await;
            report.state = RunState::Error;
            report.error = Some(error.to_string());
            report.finished_at = Some(Utc::now());
            report.clone()
        };
        control.emit(RunEvent::error(error.to_string()));
        report
    }

    async fn finish(&self, control: &RunControl, logger: &RunLogger) -> RunReport {
        record_run(RunState::Done.as_str());

        let report = {
            let mut report = control.report.write().await;
            report.state = RunState::Done;
            report.finished_at = Some(Utc::now());
            report.clone()
        };
        logger.log_completion(&format!(
            "{} uploaded, {} failed, {} skipped",
            report.uploaded(),
            report.failed(),
            report.skipped()
        ));
        control.emit(RunEvent::Done {
            state: RunState::Done,
            uploaded: report.uploaded(),
            failed: report.failed(),
            skipped: report.skipped(),
        });
        report
    }
}

fn skipped(row: &Row, reason: SkipReason) -> RowReport {
    RowReport {
        index: row.index,
        line: row.line,
        source_url: row.source_url.clone(),
        title: None,
        outcome: RowOutcome::Skipped { reason },
    }
}
