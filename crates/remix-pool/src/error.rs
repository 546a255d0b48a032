//! Pool error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for pooled calls.
pub type PoolResult<T, E> = Result<T, PoolError<E>>;

/// Reasons a slot could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("Credential pool '{0}' exhausted: no usable slots remain")]
    Exhausted(String),

    #[error("Timed out after {0:?} waiting for a credential slot")]
    Timeout(Duration),
}

/// Error returned by [`crate::CredentialPool::call`].
#[derive(Debug, Error)]
pub enum PoolError<E> {
    #[error("Credential pool '{0}' exhausted: no usable slots remain")]
    Exhausted(String),

    #[error("Timed out after {0:?} waiting for a credential slot")]
    AcquireTimeout(Duration),

    /// Non-retryable failure reported by the service.
    #[error("{0}")]
    Call(E),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: E },
}

impl<E> PoolError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted(_))
    }

    /// The underlying service error, if the call got that far.
    pub fn into_inner(self) -> Option<E> {
        match self {
            PoolError::Call(e) | PoolError::RetriesExhausted { last: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl<E> From<AcquireError> for PoolError<E> {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Exhausted(name) => PoolError::Exhausted(name),
            AcquireError::Timeout(d) => PoolError::AcquireTimeout(d),
        }
    }
}
