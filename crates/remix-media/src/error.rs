//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use remix_models::ClipRef;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid audio file: {0}")]
    InvalidAudio(String),

    #[error("Timeline rejected: {0}")]
    TimelineRejected(#[from] TimelineRejection),

    #[error("Rendered duration {actual:.3}s differs from {expected:.3}s by more than one frame")]
    DurationMismatch { expected: f64, actual: f64 },
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }

    pub fn invalid_audio(message: impl Into<String>) -> Self {
        Self::InvalidAudio(message.into())
    }
}

/// Why a remix plan could not become a timeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineRejection {
    #[error("total duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("plan has no entries")]
    NoEntries,

    #[error("fractions sum to {0}, expected 1.0")]
    FractionSum(f64),

    #[error("entry {index} has non-positive fraction {fraction}")]
    NonPositiveFraction { index: usize, fraction: f64 },

    #[error("clip '{0}' is not in the catalog")]
    UnresolvedClip(ClipRef),

    #[error("clip '{clip}' is {available:.3}s long but segment needs {needed:.3}s")]
    SourceTooShort {
        clip: ClipRef,
        needed: f64,
        available: f64,
    },

    #[error("segments {index} and {next} do not partition the timeline")]
    Partition { index: usize, next: usize },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
}

impl TimelineRejection {
    /// Construction stage that produced the rejection.
    pub fn stage(&self) -> &'static str {
        match self {
            TimelineRejection::InvalidTransition(_) => "transition_insertion",
            _ => "input_validation",
        }
    }
}
