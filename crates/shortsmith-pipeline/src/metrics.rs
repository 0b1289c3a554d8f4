//! Run and row metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Rows finished, by outcome.
    pub const ROWS_TOTAL: &str = "shortsmith_rows_total";

    /// Runs finished, by terminal state.
    pub const RUNS_TOTAL: &str = "shortsmith_runs_total";

    /// Wall time of one processed row.
    pub const ROW_DURATION_SECONDS: &str = "shortsmith_row_duration_seconds";
}

pub fn record_row(outcome: &'static str, duration_secs: Option<f64>) {
    counter!(names::ROWS_TOTAL, "outcome" => outcome).increment(1);
    if let Some(secs) = duration_secs {
        histogram!(names::ROW_DURATION_SECONDS, "outcome" => outcome).record(secs);
    }
}

pub fn record_run(state: &'static str) {
    counter!(names::RUNS_TOTAL, "state" => state).increment(1);
}
