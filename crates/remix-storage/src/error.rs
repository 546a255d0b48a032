//! Storage error types.

use thiserror::Error;

use remix_pool::{FailureKind, PoolError, RetryClassify};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {message}")]
    UploadFailed { message: String, status: Option<u16> },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String, status: Option<u16> },

    /// Connection, dispatch or timeout failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid object URI: {0}")]
    InvalidUri(String),

    /// Every storage credential has been rejected.
    #[error("Storage pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::UploadFailed {
            message: msg.into(),
            status,
        }
    }

    pub fn download_failed(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::DownloadFailed {
            message: msg.into(),
            status,
        }
    }

    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri(uri.into())
    }

    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, StorageError::PoolExhausted(_))
    }
}

impl RetryClassify for StorageError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StorageError::UploadFailed { status, .. } | StorageError::DownloadFailed { status, .. } => {
                match status {
                    // S3 throttles with 503 SlowDown.
                    Some(503) | Some(429) => FailureKind::RateLimited { retry_after: None },
                    Some(code) => FailureKind::from_status(*code, None),
                    None => FailureKind::Transient,
                }
            }
            StorageError::Transport(_) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

impl From<PoolError<StorageError>> for StorageError {
    fn from(err: PoolError<StorageError>) -> Self {
        match err {
            PoolError::Call(e) | PoolError::RetriesExhausted { last: e, .. } => e,
            PoolError::Exhausted(pool) => StorageError::PoolExhausted(pool),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            StorageError::upload_failed("slow down", Some(503)).failure_kind(),
            FailureKind::RateLimited { retry_after: None }
        );
        assert_eq!(
            StorageError::download_failed("boom", Some(500)).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            StorageError::upload_failed("denied", Some(403)).failure_kind(),
            FailureKind::Credential
        );
        assert_eq!(
            StorageError::Transport("reset".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(StorageError::not_found("k").failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_from_pool_error() {
        let err: StorageError = PoolError::<StorageError>::Exhausted("storage".into()).into();
        assert!(err.is_pool_exhausted());

        let err: StorageError =
            PoolError::<StorageError>::AcquireTimeout(std::time::Duration::from_secs(1)).into();
        assert!(matches!(err, StorageError::Unavailable(_)));

        let err: StorageError = PoolError::Call(StorageError::not_found("k")).into();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
