//! Structured run logging.

use tracing::{error, info, warn, Span};

use shortsmith_models::RunId;

/// Stamps `run_id` (and `row` once scoped) on every run lifecycle event.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    row: Option<usize>,
}

impl RunLogger {
    pub fn new(run_id: &RunId) -> Self {
        Self {
            run_id: run_id.to_string(),
            row: None,
        }
    }

    /// A logger for one row of the same run.
    pub fn for_row(&self, row: usize) -> Self {
        Self {
            run_id: self.run_id.clone(),
            row: Some(row),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, row = ?self.row, "Run started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(run_id = %self.run_id, row = ?self.row, "Run progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(run_id = %self.run_id, row = ?self.row, "Run warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(run_id = %self.run_id, row = ?self.row, "Run error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, row = ?self.row, "Run completed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn row(&self) -> Option<usize> {
        self.row
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, row = ?self.row)
    }
}
