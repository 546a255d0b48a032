//! Structured run logging.
//!
//! Provides consistent, structured logging for pipeline runs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use remix_models::RunId;

/// Run logger for structured logging with consistent formatting.
///
/// Every event carries the run ID and the stage currently executing.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    stage: &'static str,
}

impl RunLogger {
    pub fn new(run_id: &RunId) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage: "init",
        }
    }

    pub fn from_string(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage: "init",
        }
    }

    /// The same run, now in `stage`.
    pub fn stage(&self, stage: &'static str) -> Self {
        Self {
            run_id: self.run_id.clone(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = self.stage,
            "Stage progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            stage = self.stage,
            "Stage warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            stage = self.stage,
            "Run failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            stage = self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn current_stage(&self) -> &'static str {
        self.stage
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id)
    }
}
