//! Structural description of a generated track.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Drop timestamp and total length of an audio track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AudioStructureParts")]
pub struct AudioStructure {
    drop_ts: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct AudioStructureParts {
    drop_ts: f64,
    duration: f64,
}

impl TryFrom<AudioStructureParts> for AudioStructure {
    type Error = ModelError;

    fn try_from(parts: AudioStructureParts) -> Result<Self, Self::Error> {
        Self::new(parts.drop_ts, parts.duration)
    }
}

impl AudioStructure {
    /// `duration` must be positive and `drop_ts` must lie in `[0, duration)`.
    pub fn new(drop_ts: f64, duration: f64) -> ModelResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ModelError::InvalidDuration(duration));
        }
        if !drop_ts.is_finite() || drop_ts < 0.0 || drop_ts >= duration {
            return Err(ModelError::DropBeyondDuration { drop_ts, duration });
        }
        Ok(Self { drop_ts, duration })
    }

    /// Build from a millisecond timestamp as reported by detectors.
    pub fn from_millis(drop_ms: f64, duration: f64) -> ModelResult<Self> {
        Self::new(drop_ms / 1000.0, duration)
    }

    pub fn drop_ts(&self) -> f64 {
        self.drop_ts
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}
