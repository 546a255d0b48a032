//! Worker and per-run configuration.

use std::path::PathBuf;
use std::time::Duration;

use remix_ai::analyzer::DEFAULT_ANALYSIS_TIMEOUT;
use remix_ai::detector::DEFAULT_DETECTION_TIMEOUT;
use remix_models::{MusicStyle, TransitionSpec};

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent runs
    pub max_concurrent_runs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/remix"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_runs: std::env::var("WORKER_MAX_RUNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/remix")),
        }
    }
}

/// Settings for one pipeline run.
///
/// Everything a run depends on is here; nothing is read from the process
/// environment once a run has started.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub style: MusicStyle,
    pub transition: TransitionSpec,
    pub analysis_timeout: Duration,
    pub detection_timeout: Duration,
    /// Audio fade at the end of the output, in seconds
    pub fade_out: f64,
    /// Object key prefix for published outputs
    pub output_prefix: String,
    /// Parent of the per-run scratch directories
    pub work_dir: PathBuf,
    /// Output frame rate; the analyzed clip's rate when unset
    pub fps_override: Option<f64>,
    /// Cap the output to the shortest clip instead of the analyzed one
    pub cap_to_shortest: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            style: MusicStyle::default(),
            transition: TransitionSpec::default(),
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            detection_timeout: DEFAULT_DETECTION_TIMEOUT,
            fade_out: 1.0,
            output_prefix: "remixes".to_string(),
            work_dir: PathBuf::from("/tmp/remix"),
            fps_override: None,
            cap_to_shortest: true,
        }
    }
}

impl RunConfig {
    pub fn with_style(mut self, style: MusicStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Key of the published remix for `run_id`.
    pub fn output_key(&self, run_id: &str) -> String {
        let prefix = self.output_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{}/remix.mp4", run_id)
        } else {
            format!("{}/{}/remix.mp4", prefix, run_id)
        }
    }
}
