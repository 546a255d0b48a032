//! Pipeline metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod names {
    /// Finished runs by outcome.
    pub const RUNS_TOTAL: &str = "remix_runs_total";

    /// Stage wall time in seconds by stage.
    pub const STAGE_SECONDS: &str = "remix_stage_seconds";
}

pub fn record_run(outcome: &'static str) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_stage(stage: &'static str, elapsed: Duration) {
    histogram!(names::STAGE_SECONDS, "stage" => stage).record(elapsed.as_secs_f64());
}
