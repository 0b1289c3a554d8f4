//! Run identifiers, per-row outcomes and run reports.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted, rows not read yet
    #[default]
    Idle,
    /// Rows are being processed
    Processing,
    /// Every row has an outcome
    Done,
    /// Setup failed before any row was processed
    Error,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Processing => "processing",
            RunState::Done => "done",
            RunState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Error)
    }
}

/// Stage a row was in when it finished or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    Schedule,
    Render,
    Download,
    Compose,
    Upload,
}

impl RowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStage::Schedule => "schedule",
            RowStage::Render => "render",
            RowStage::Download => "download",
            RowStage::Compose => "compose",
            RowStage::Upload => "upload",
        }
    }
}

impl fmt::Display for RowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a row was never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An earlier upload exhausted the channel's quota
    QuotaExceeded,
    /// The uploader lost its authorization mid-run
    UploaderUnauthorized,
    /// The user asked the run to stop
    Stopped,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::QuotaExceeded => "quota_exceeded",
            SkipReason::UploaderUnauthorized => "uploader_unauthorized",
            SkipReason::Stopped => "stopped",
        }
    }
}

/// Outcome of one row. Every row with a source URL gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Uploaded {
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        publish_at: Option<DateTime<Utc>>,
    },
    Failed {
        stage: RowStage,
        error: String,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RowOutcome::Uploaded { .. } => "uploaded",
            RowOutcome::Failed { .. } => "failed",
            RowOutcome::Skipped { .. } => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Uploaded { .. })
    }
}

/// Outcome of one row plus what identifies it in the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RowReport {
    /// 0-based data row index
    pub index: usize,
    /// Worksheet line the row came from
    pub line: usize,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub outcome: RowOutcome,
}

/// Aggregated result of a run, kept for the lifetime of the server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of rows with a source URL, known once the sheet is read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,
    pub rows: Vec<RowReport>,
    /// Setup error that moved the run to `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            total_rows: None,
            rows: Vec::new(),
            error: None,
        }
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Uploaded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&RowOutcome) -> bool) -> usize {
        self.rows.iter().filter(|r| pred(&r.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RowOutcome) -> RowReport {
        RowReport {
            index: 0,
            line: 2,
            source_url: "https://youtube.com/shorts/aaaaaaaaaaa".to_string(),
            title: None,
            outcome,
        }
    }

    #[test]
    fn test_run_report_counters() {
        let mut run = RunReport::new(RunId::new());
        run.rows.push(report(RowOutcome::Uploaded {
            video_id: "vid".to_string(),
            publish_at: None,
        }));
        run.rows.push(report(RowOutcome::Failed {
            stage: RowStage::Download,
            error: "boom".to_string(),
        }));
        run.rows.push(report(RowOutcome::Skipped {
            reason: SkipReason::Stopped,
        }));

        assert_eq!(run.uploaded(), 1);
        assert_eq!(run.failed(), 1);
        assert_eq!(run.skipped(), 1);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(RowOutcome::Failed {
            stage: RowStage::Compose,
            error: "no video stream".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "compose");

        let json = serde_json::to_value(RowOutcome::Skipped {
            reason: SkipReason::QuotaExceeded,
        })
        .unwrap();
        assert_eq!(json["reason"], "quota_exceeded");
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Processing.is_terminal());
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Error.is_terminal());
    }
}
