//! Firestore error types.

use std::time::Duration;

use thiserror::Error;

use remix_pool::{FailureKind, PoolError, RetryClassify};

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error {0}: {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Retry-After in milliseconds, when the server sent one.
    #[error("Rate limited")]
    RateLimited(Option<u64>),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every Firestore credential has been rejected.
    #[error("Record store pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            429 => Self::RateLimited(None),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// Attach a parsed Retry-After to a rate-limit error.
    pub fn with_retry_after(self, retry_after: Option<Duration>) -> Self {
        match self {
            Self::RateLimited(_) => Self::RateLimited(retry_after.map(|d| d.as_millis() as u64)),
            other => other,
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::RequestFailed(_) => Some(400),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, FirestoreError::PoolExhausted(_))
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_) | FirestoreError::RateLimited(_) | FirestoreError::ServerError(..)
        )
    }
}

impl RetryClassify for FirestoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            FirestoreError::RateLimited(ms) => FailureKind::RateLimited {
                retry_after: ms.map(Duration::from_millis),
            },
            FirestoreError::AuthError(_) | FirestoreError::PermissionDenied(_) => {
                FailureKind::Credential
            }
            FirestoreError::ServerError(..) => FailureKind::Transient,
            FirestoreError::Network(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                FailureKind::Transient
            }
            FirestoreError::Network(e) => match e.status() {
                Some(status) => FailureKind::from_status(status.as_u16(), None),
                None => FailureKind::Transient,
            },
            _ => FailureKind::Permanent,
        }
    }
}

impl From<PoolError<FirestoreError>> for FirestoreError {
    fn from(err: PoolError<FirestoreError>) -> Self {
        match err {
            PoolError::Call(e) | PoolError::RetriesExhausted { last: e, .. } => e,
            PoolError::Exhausted(pool) => FirestoreError::PoolExhausted(pool),
            other => FirestoreError::Unavailable(other.to_string()),
        }
    }
}
