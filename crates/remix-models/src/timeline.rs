//! Remix plans, segments and transitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Opaque handle to a source clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipRef(pub String);

impl ClipRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClipRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Half-open span `[start, end)` of the output timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    #[default]
    ZoomSlam,
}

/// Scale animation that straddles a cut point.
///
/// Half of `duration` plays on the tail of the outgoing segment and half on
/// the head of the incoming one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionSpec {
    pub kind: TransitionKind,
    pub scale_start: f64,
    pub scale_end: f64,
    pub duration: f64,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            kind: TransitionKind::ZoomSlam,
            scale_start: 1.1,
            scale_end: 1.0,
            duration: 0.2,
        }
    }
}

impl TransitionSpec {
    pub fn zoom_slam(scale_start: f64, duration: f64) -> ModelResult<Self> {
        let spec = Self {
            kind: TransitionKind::ZoomSlam,
            scale_start,
            scale_end: 1.0,
            duration,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if !(self.scale_start.is_finite() && self.scale_start > 1.0) {
            return Err(ModelError::InvalidTransition(format!(
                "scale_start must be greater than 1.0, got {}",
                self.scale_start
            )));
        }
        if self.scale_end != 1.0 {
            return Err(ModelError::InvalidTransition(format!(
                "scale_end must be 1.0, got {}",
                self.scale_end
            )));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(ModelError::InvalidTransition(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        Ok(())
    }

    pub fn half(&self) -> f64 {
        self.duration / 2.0
    }

    /// Scale at `t` seconds relative to the cut (negative is before it).
    ///
    /// Linear from `scale_start` at `-duration/2` down to `scale_end` at
    /// `+duration/2`; constant outside that window.
    pub fn scale_at(&self, t: f64) -> f64 {
        let progress = ((t + self.half()) / self.duration).clamp(0.0, 1.0);
        if t < -self.half() {
            return 1.0;
        }
        self.scale_start + (self.scale_end - self.scale_start) * progress
    }
}

/// One span of the output timeline backed by a source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub source_clip: ClipRef,
    pub range: TimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_at_end: Option<TransitionSpec>,
}

/// Requested share of the output for one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanEntry {
    pub clip: ClipRef,
    pub fraction: f64,
}

impl PlanEntry {
    pub fn new(clip: impl Into<ClipRef>, fraction: f64) -> Self {
        Self {
            clip: clip.into(),
            fraction,
        }
    }
}

/// Unvalidated description of a remix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemixPlan {
    pub total_duration: f64,
    pub entries: Vec<PlanEntry>,
    #[serde(default)]
    pub transition: TransitionSpec,
}

impl RemixPlan {
    pub fn new(total_duration: f64, entries: Vec<PlanEntry>) -> Self {
        Self {
            total_duration,
            entries,
            transition: TransitionSpec::default(),
        }
    }

    /// Equal share for every clip, in the given order.
    pub fn equal_split(total_duration: f64, clips: impl IntoIterator<Item = ClipRef>) -> Self {
        let clips: Vec<ClipRef> = clips.into_iter().collect();
        let fraction = 1.0 / clips.len().max(1) as f64;
        let entries = clips
            .into_iter()
            .map(|clip| PlanEntry { clip, fraction })
            .collect();
        Self::new(total_duration, entries)
    }

    pub fn with_transition(mut self, transition: TransitionSpec) -> Self {
        self.transition = transition;
        self
    }

    pub fn fraction_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.fraction).sum()
    }
}
