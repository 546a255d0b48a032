//! Drop offsets and alignment planning.
//!
//! The offset is plain arithmetic on the two drop timestamps. Whether the
//! shift is applied is decided here as well, so the media layer only has to
//! execute an [`AlignmentPlan`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::AudioStructure;
use crate::structure::VideoStructure;

/// Which way the track has to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Audio drop is late: trim the head.
    AdvanceAudio,
    /// Audio drop is early: pad the head with silence.
    DelayAudio,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::AdvanceAudio => "advance_audio",
            Direction::DelayAudio => "delay_audio",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signed shift between video drop and audio drop, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Offset {
    /// `video.drop_ts - audio.drop_ts`
    pub delta: f64,
    pub direction: Direction,
}

impl Offset {
    /// Offset that moves `audio_drop` onto `video_drop`.
    pub fn between(video_drop: f64, audio_drop: f64) -> Self {
        let delta = video_drop - audio_drop;
        let direction = if delta < 0.0 {
            Direction::AdvanceAudio
        } else {
            Direction::DelayAudio
        };
        Self { delta, direction }
    }

    pub fn magnitude(&self) -> f64 {
        self.delta.abs()
    }

    /// Whether the shift leaves part of a track of `duration` seconds audible.
    pub fn is_within(&self, duration: f64) -> bool {
        self.magnitude() < duration
    }
}

/// Offset between a video's drop and a track's drop.
pub fn compute_offset(video: &VideoStructure, audio: &AudioStructure) -> Offset {
    Offset::between(video.drop_ts(), audio.drop_ts())
}

/// Why a run kept the generated track unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OffsetOutOfRange,
    NoDetectableDrop,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OffsetOutOfRange => "offset_out_of_range",
            SkipReason::NoDetectableDrop => "no_detectable_drop",
        }
    }
}

/// Outcome of the alignment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AlignmentStatus {
    Applied,
    Skipped { reason: SkipReason },
}

impl AlignmentStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, AlignmentStatus::Applied)
    }

    /// Value stored in the run record: `applied` or `skipped:<reason>`.
    pub fn record_value(&self) -> String {
        match self {
            AlignmentStatus::Applied => "applied".to_string(),
            AlignmentStatus::Skipped { reason } => format!("skipped:{}", reason.as_str()),
        }
    }
}

impl fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record_value())
    }
}

/// What the media layer must do to the generated track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AlignmentPlan {
    /// Pad and/or trim the head, then fit the track to `output_duration`.
    Shift {
        lead_silence: f64,
        trim_head: f64,
        output_duration: f64,
    },
    /// Keep the track byte-for-byte.
    Passthrough { reason: SkipReason },
}

impl AlignmentPlan {
    /// Decide how to apply `offset` to `audio` for an output of
    /// `output_duration` seconds.
    ///
    /// A shift of at least the track's length would leave nothing audible,
    /// so it is skipped instead of raised.
    pub fn for_offset(offset: &Offset, audio: &AudioStructure, output_duration: f64) -> Self {
        if !offset.is_within(audio.duration()) {
            return AlignmentPlan::Passthrough {
                reason: SkipReason::OffsetOutOfRange,
            };
        }

        let (lead_silence, trim_head) = match offset.direction {
            Direction::DelayAudio => (offset.magnitude(), 0.0),
            Direction::AdvanceAudio => (0.0, offset.magnitude()),
        };

        AlignmentPlan::Shift {
            lead_silence,
            trim_head,
            output_duration,
        }
    }

    /// Plan used when the track has no detectable drop.
    pub fn no_drop() -> Self {
        AlignmentPlan::Passthrough {
            reason: SkipReason::NoDetectableDrop,
        }
    }

    pub fn status(&self) -> AlignmentStatus {
        match self {
            AlignmentPlan::Shift { .. } => AlignmentStatus::Applied,
            AlignmentPlan::Passthrough { reason } => AlignmentStatus::Skipped { reason: *reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Section, SectionLabel};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn video(drop_ts: f64) -> VideoStructure {
        VideoStructure::new(
            120.0,
            vec![
                Section::new(SectionLabel::Build, 0.0, 10.0),
                Section::new(SectionLabel::Drop, 10.0, 30.0),
            ],
            drop_ts,
        )
        .unwrap()
    }

    #[test]
    fn test_delay_when_audio_drop_is_early() {
        let audio = AudioStructure::new(10.5, 40.0).unwrap();
        let offset = compute_offset(&video(12.0), &audio);
        assert!((offset.delta - 1.5).abs() < 1e-9);
        assert_eq!(offset.direction, Direction::DelayAudio);

        let plan = AlignmentPlan::for_offset(&offset, &audio, 30.0);
        match plan {
            AlignmentPlan::Shift {
                lead_silence,
                trim_head,
                output_duration,
            } => {
                assert!((lead_silence - 1.5).abs() < 1e-9);
                assert_eq!(trim_head, 0.0);
                assert_eq!(output_duration, 30.0);
            }
            other => panic!("unexpected plan {other:?}"),
        }
        assert_eq!(plan.status(), AlignmentStatus::Applied);
    }

    #[test]
    fn test_advance_when_audio_drop_is_late() {
        let audio = AudioStructure::new(14.0, 40.0).unwrap();
        let offset = compute_offset(&video(12.0), &audio);
        assert_eq!(offset.direction, Direction::AdvanceAudio);
        assert!((offset.delta + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_is_antisymmetric() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let a = rng.random_range(0.0..120.0);
            let b = rng.random_range(0.0..120.0);
            let forward = Offset::between(a, b);
            let backward = Offset::between(b, a);
            assert_eq!(forward.delta, -backward.delta);
        }
    }

    #[test]
    fn test_out_of_range_is_skipped() {
        let audio = AudioStructure::new(0.5, 2.0).unwrap();
        let offset = compute_offset(&video(12.0), &audio);
        let plan = AlignmentPlan::for_offset(&offset, &audio, 30.0);
        assert_eq!(
            plan,
            AlignmentPlan::Passthrough {
                reason: SkipReason::OffsetOutOfRange
            }
        );
        assert_eq!(plan.status().record_value(), "skipped:offset_out_of_range");
    }

    #[test]
    fn test_record_values() {
        assert_eq!(AlignmentStatus::Applied.record_value(), "applied");
        assert_eq!(
            AlignmentPlan::no_drop().status().record_value(),
            "skipped:no_detectable_drop"
        );
    }
}
