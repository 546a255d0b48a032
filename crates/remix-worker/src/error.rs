//! Run error types.

use std::time::Duration;

use thiserror::Error;

use remix_ai::AiError;
use remix_firestore::FirestoreError;
use remix_media::{MediaError, TimelineRejection};
use remix_storage::StorageError;

pub type RunResult<T> = Result<T, RunError>;

/// Why a run failed.
///
/// A missing drop or an out-of-range offset is not here: those complete
/// the run with the alignment reported as skipped.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Credential pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Analysis exceeded {0:?}")]
    AnalysisTimeout(Duration),

    #[error("Music generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timeline rejected: {0}")]
    TimelineRejected(#[from] TimelineRejection),

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Record store error: {0}")]
    Record(FirestoreError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    /// Map an analyzer or detector failure.
    pub fn from_analysis(err: AiError) -> Self {
        match err {
            AiError::PoolExhausted(msg) => Self::PoolExhausted(msg),
            AiError::AnalysisTimeout(budget) => Self::AnalysisTimeout(budget),
            other => Self::AnalysisUnavailable(other.to_string()),
        }
    }

    /// Map a composer failure.
    pub fn from_generation(err: AiError) -> Self {
        match err {
            AiError::PoolExhausted(msg) => Self::PoolExhausted(msg),
            other => Self::GenerationFailed(other.to_string()),
        }
    }

    /// Whether re-running the failed stage later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunError::AnalysisUnavailable(_) | RunError::AnalysisTimeout(_)
        )
    }

    /// Label for the `remix_runs_total` outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            RunError::PoolExhausted(_) => "pool_exhausted",
            RunError::AnalysisUnavailable(_) => "analysis_unavailable",
            RunError::AnalysisTimeout(_) => "analysis_timeout",
            RunError::GenerationFailed(_) => "generation_failed",
            RunError::TimelineRejected(_) => "timeline_rejected",
            RunError::InvalidRequest(_) => "invalid_request",
            RunError::Media(_) => "media_failed",
            RunError::Storage(_) => "storage_failed",
            RunError::Record(_) => "record_failed",
            RunError::Cancelled => "cancelled",
            RunError::TaskFailed(_) => "task_failed",
            RunError::Io(_) => "io_failed",
        }
    }
}

impl From<StorageError> for RunError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PoolExhausted(pool) => Self::PoolExhausted(pool),
            other => Self::Storage(other),
        }
    }
}

impl From<FirestoreError> for RunError {
    fn from(err: FirestoreError) -> Self {
        match err {
            FirestoreError::PoolExhausted(pool) => Self::PoolExhausted(pool),
            other => Self::Record(other),
        }
    }
}

impl From<MediaError> for RunError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::TimelineRejected(rejection) => Self::TimelineRejected(rejection),
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Media(other),
        }
    }
}
