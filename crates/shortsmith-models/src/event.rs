//! Progress events streamed to the web UI.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::run::{RowReport, RowStage, RunState};

/// Progress event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Free-form log line
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A row entered the pipeline
    RowStarted {
        index: usize,
        /// 1-based position among rows with a source URL
        position: usize,
        total: usize,
        source_url: String,
    },

    /// A row moved to a new stage
    RowStage { index: usize, stage: RowStage },

    /// A row finished with its outcome
    RowFinished { report: RowReport },

    /// The run reached a terminal state
    Done {
        state: RunState,
        uploaded: usize,
        failed: usize,
        skipped: usize,
    },

    /// Setup error; no further events follow
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn log(message: impl Into<String>) -> Self {
        RunEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RunEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RunEvent::Log { .. } => "log",
            RunEvent::RowStarted { .. } => "row_started",
            RunEvent::RowStage { .. } => "row_stage",
            RunEvent::RowFinished { .. } => "row_finished",
            RunEvent::Done { .. } => "done",
            RunEvent::Error { .. } => "error",
        }
    }

    /// Whether this event closes the stream.
    pub fn is_final(&self) -> bool {
        matches!(self, RunEvent::Done { .. } | RunEvent::Error { .. })
    }
}
