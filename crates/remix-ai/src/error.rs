//! AI client error types.

use std::time::Duration;

use thiserror::Error;

use remix_pool::{FailureKind, PoolError, RetryClassify};

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    /// MiniMax reports failures in `base_resp` with HTTP 200.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The service answered without a usable result.
    #[error("Empty output: {0}")]
    EmptyOutput(String),

    #[error("Uploaded file failed processing: {0}")]
    FileProcessing(String),

    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Analysis exceeded {0:?}")]
    AnalysisTimeout(Duration),

    #[error("No detectable drop: {0}")]
    NoDetectableDrop(String),

    /// Every credential slot is exhausted or none could be acquired.
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn analysis_unavailable(msg: impl Into<String>) -> Self {
        Self::AnalysisUnavailable(msg.into())
    }

    pub fn no_detectable_drop(msg: impl Into<String>) -> Self {
        Self::NoDetectableDrop(msg.into())
    }

    pub fn http(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            retry_after,
        }
    }

    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, AiError::PoolExhausted(_))
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs may carry signed upload sessions.
        let err = err.without_url();
        match err.status() {
            Some(status) => AiError::http(status.as_u16(), err.to_string(), None),
            None if err.is_decode() => AiError::InvalidResponse(err.to_string()),
            None => AiError::Transport(err.to_string()),
        }
    }
}

impl RetryClassify for AiError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            AiError::Http {
                status,
                retry_after,
                ..
            } => FailureKind::from_status(*status, *retry_after),
            AiError::Transport(_) | AiError::EmptyOutput(_) => FailureKind::Transient,
            AiError::Api { code, .. } => match code {
                // rate limit
                1002 => FailureKind::RateLimited { retry_after: None },
                // unknown error, timeout, internal error
                1000 | 1001 | 1013 => FailureKind::Transient,
                _ => FailureKind::Permanent,
            },
            _ => FailureKind::Permanent,
        }
    }
}

impl From<PoolError<AiError>> for AiError {
    fn from(err: PoolError<AiError>) -> Self {
        match err {
            PoolError::Call(e) | PoolError::RetriesExhausted { last: e, .. } => e,
            other => AiError::PoolExhausted(other.to_string()),
        }
    }
}
