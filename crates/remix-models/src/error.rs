//! Model validation errors.

use thiserror::Error;

/// Result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when a model value violates its invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("BPM must be a positive number, got {0}")]
    InvalidBpm(f64),

    #[error("Structure has no sections")]
    EmptySections,

    #[error("Section {index} has invalid span [{start}, {end})")]
    InvalidSection { index: usize, start: f64, end: f64 },

    #[error("Section {index} starts at {found} but previous section ends at {expected}")]
    NonContiguous {
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error("Drop timestamp {0} is not inside exactly one section")]
    DropOutsideSections(f64),

    #[error("Drop timestamp {drop_ts} is not inside a track of {duration}s")]
    DropBeyondDuration { drop_ts: f64, duration: f64 },

    #[error("Duration must be positive, got {0}")]
    InvalidDuration(f64),

    #[error("Unknown section label: {0}")]
    UnknownLabel(String),

    #[error("Unknown music style: {0}")]
    UnknownStyle(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}
