//! In-memory registry of runs started by this process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, RwLock};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use shortsmith_models::{RunEvent, RunId, RunReport, RunState};
use shortsmith_pipeline::{Pipeline, RunControl, RunRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Buffered events per run before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 256;

/// Handles for one run: its live report, event stream and stop flag.
pub struct RunHandle {
    report: Arc<RwLock<RunReport>>,
    events: broadcast::Sender<RunEvent>,
    stop: watch::Sender<bool>,
}

impl RunHandle {
    pub async fn snapshot(&self) -> RunReport {
        self.report.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Ask the run to stop before its next row.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Move a run whose task died before finishing to `Error`.
    async fn abort(&self, cause: &str) -> RunReport {
        error!(cause = %cause, "Run task aborted");
        let report = {
            let mut report = self.report.write().await;
            if !report.state.is_terminal() {
                report.state = RunState::Error;
                report.error = Some(format!("run aborted: {cause}"));
                report.finished_at = Some(Utc::now());
            }
            report.clone()
        };
        let _ = self.events.send(RunEvent::error(
            report.error.clone().unwrap_or_else(|| "run aborted".to_string()),
        ));
        report
    }
}

/// Tracks every run; at most one is non-terminal at a time.
pub struct RunRegistry {
    pipeline: Arc<Pipeline>,
    runs: RwLock<HashMap<RunId, Arc<RunHandle>>>,
}

impl RunRegistry {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Start a run in the background.
    ///
    /// The uploaded clip at `request.clip_path` is owned by the run from here
    /// on and deleted when it finishes.
    pub async fn start(&self, request: RunRequest) -> ApiResult<RunId> {
        let mut runs = self.runs.write().await;
        for handle in runs.values() {
            let report = handle.report.read().await;
            if !report.state.is_terminal() {
                metrics::record_run_rejected();
                return Err(ApiError::conflict(format!(
                    "run {} is still {}",
                    report.run_id,
                    report.state.as_str()
                )));
            }
        }

        let run_id = RunId::new();
        let report = Arc::new(RwLock::new(RunReport::new(run_id.clone())));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        let control = RunControl {
            events: events.clone(),
            stop: stop_rx,
            report: Arc::clone(&report),
        };
        let handle = Arc::new(RunHandle {
            report,
            events,
            stop: stop_tx,
        });
        runs.insert(run_id.clone(), Arc::clone(&handle));
        drop(runs);

        metrics::record_run_started();
        info!(run_id = %run_id, source = %request.source, "Run started");

        let pipeline = Arc::clone(&self.pipeline);
        let id = run_id.clone();
        tokio::spawn(async move {
            let clip = request.clip_path.clone();
            let run = tokio::spawn(async move { pipeline.run(request, control).await });
            let report = match run.await {
                Ok(report) => report,
                Err(e) => handle.abort(&e.to_string()).await,
            };
            info!(
                run_id = %id,
                state = report.state.as_str(),
                uploaded = report.uploaded(),
                failed = report.failed(),
                skipped = report.skipped(),
                "Run finished"
            );
            if let Err(e) = tokio::fs::remove_file(&clip).await {
                debug!("Failed to remove clip {}: {}", clip.display(), e);
            }
        });

        Ok(run_id)
    }

    pub async fn get(&self, run_id: &RunId) -> Option<Arc<RunHandle>> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Request a stop. Stopping a finished run is a no-op.
    pub async fn stop(&self, run_id: &RunId) -> ApiResult<RunReport> {
        let handle = self
            .get(run_id)
            .await
            .ok_or_else(|| ApiError::not_found(format!("run {run_id}")))?;

        let report = handle.snapshot().await;
        if report.state.is_terminal() {
            warn!(run_id = %run_id, "Stop requested for finished run");
        } else {
            info!(run_id = %run_id, "Stop requested");
            handle.request_stop();
        }
        Ok(report)
    }

    /// Reports of all runs, newest first.
    pub async fn list(&self) -> Vec<RunReport> {
        let handles: Vec<Arc<RunHandle>> = self.runs.read().await.values().cloned().collect();
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(handle.snapshot().await);
        }
        reports.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        reports
    }
}
