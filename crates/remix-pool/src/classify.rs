//! Failure classification for pooled calls.

use std::time::Duration;

/// How the pool should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The service throttled this key. Cool the slot down and rotate.
    RateLimited { retry_after: Option<Duration> },
    /// Network or server hiccup. Retry on the same slot.
    Transient,
    /// The service rejected the key itself. Counts toward exhausting the slot.
    Credential,
    /// Bad request, missing object and the like. Never retried.
    Permanent,
}

/// Implemented by every error type that flows through the pool.
pub trait RetryClassify {
    fn failure_kind(&self) -> FailureKind;
}

impl FailureKind {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => FailureKind::RateLimited { retry_after },
            401 | 403 => FailureKind::Credential,
            408 | 500..=599 => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
