//! Segmented remix timeline construction.
//!
//! A [`RemixPlan`] goes through input validation and transition insertion
//! and ends either as a [`RemixTimeline`] or as a [`TimelineRejection`].
//! Nothing is rendered until construction has succeeded, so an invalid plan
//! never produces partial output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use remix_models::{ClipRef, RemixPlan, Segment, TimeRange, TransitionSpec};

use crate::error::{MediaResult, TimelineRejection};
use crate::probe::probe_video;

/// Allowed deviation of the fraction sum from 1.0.
pub const FRACTION_TOLERANCE: f64 = 1e-3;

/// Tolerance for float comparisons on segment boundaries.
const BOUNDARY_EPSILON: f64 = 1e-6;

/// A clip reference resolved to a local file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClip {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
}

/// Lookup from clip references to local files.
#[derive(Debug, Clone, Default)]
pub struct ClipCatalog {
    clips: HashMap<ClipRef, ResolvedClip>,
}

impl ClipCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, clip: ClipRef, path: impl Into<PathBuf>, duration: f64) {
        self.clips.insert(
            clip,
            ResolvedClip {
                path: path.into(),
                duration,
            },
        );
    }

    /// Probe `path` and register it under `clip`.
    pub async fn insert_probed(&mut self, clip: ClipRef, path: impl AsRef<Path>) -> MediaResult<f64> {
        let path = path.as_ref();
        let info = probe_video(path).await?;
        debug!(clip = %clip, duration = info.duration, "Registered clip");
        self.insert(clip, path, info.duration);
        Ok(info.duration)
    }

    pub fn resolve(&self, clip: &ClipRef) -> Option<&ResolvedClip> {
        self.clips.get(clip)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Duration of the shortest registered clip.
    ///
    /// Callers cap the remix length to this so every variant covers it.
    pub fn shortest_duration(&self) -> Option<f64> {
        self.clips
            .values()
            .map(|c| c.duration)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// One validated segment with its source file.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSegment {
    pub segment: Segment,
    pub source: ResolvedClip,
    /// Transition on the boundary this segment starts at
    pub transition_at_start: Option<TransitionSpec>,
}

impl TimelineSegment {
    pub fn range(&self) -> TimeRange {
        self.segment.range
    }

    pub fn duration(&self) -> f64 {
        self.segment.range.duration()
    }
}

/// Ordered segments that partition `[0, total_duration)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemixTimeline {
    total_duration: f64,
    fps: f64,
    segments: Vec<TimelineSegment>,
}

impl RemixTimeline {
    /// Validate `plan` against `catalog` and build the timeline.
    ///
    /// `fps` is the output frame rate; the final segment's source may fall
    /// short of its range by up to one frame interval.
    pub fn build(
        plan: &RemixPlan,
        catalog: &ClipCatalog,
        fps: f64,
    ) -> Result<Self, TimelineRejection> {
        let result = Self::validate(plan, catalog, fps)
            .and_then(|ranges| Self::insert_transitions(plan, ranges))
            .map(|segments| Self {
                total_duration: plan.total_duration,
                fps,
                segments,
            });

        match &result {
            Ok(timeline) => debug!(
                segments = timeline.segments.len(),
                total_duration = timeline.total_duration,
                "Timeline built"
            ),
            Err(rejection) => warn!(stage = rejection.stage(), "Timeline rejected: {}", rejection),
        }
        result
    }

    /// Input validation: proportional split plus source coverage.
    fn validate(
        plan: &RemixPlan,
        catalog: &ClipCatalog,
        fps: f64,
    ) -> Result<Vec<(ClipRef, TimeRange, ResolvedClip)>, TimelineRejection> {
        let total = plan.total_duration;
        if !total.is_finite() || total <= 0.0 {
            return Err(TimelineRejection::NonPositiveDuration(total));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(TimelineRejection::InvalidFrameRate(fps));
        }
        if plan.entries.is_empty() {
            return Err(TimelineRejection::NoEntries);
        }

        for (index, entry) in plan.entries.iter().enumerate() {
            if !entry.fraction.is_finite() || entry.fraction <= 0.0 {
                return Err(TimelineRejection::NonPositiveFraction {
                    index,
                    fraction: entry.fraction,
                });
            }
        }

        let sum = plan.fraction_sum();
        if (sum - 1.0).abs() > FRACTION_TOLERANCE {
            return Err(TimelineRejection::FractionSum(sum));
        }

        let frame_interval = 1.0 / fps;
        let last = plan.entries.len() - 1;
        let mut cumulative = 0.0;
        let mut ranges = Vec::with_capacity(plan.entries.len());

        for (index, entry) in plan.entries.iter().enumerate() {
            let source = catalog
                .resolve(&entry.clip)
                .ok_or_else(|| TimelineRejection::UnresolvedClip(entry.clip.clone()))?;

            let start = total * cumulative / sum;
            cumulative += entry.fraction;
            let end = if index == last {
                total
            } else {
                total * cumulative / sum
            };
            let range = TimeRange::new(start, end);

            // Segments read the same span of their source as they occupy.
            let slack = if index == last {
                frame_interval
            } else {
                BOUNDARY_EPSILON
            };
            if source.duration + slack < range.end {
                return Err(TimelineRejection::SourceTooShort {
                    clip: entry.clip.clone(),
                    needed: range.end,
                    available: source.duration,
                });
            }

            ranges.push((entry.clip.clone(), range, source.clone()));
        }

        check_partition(total, ranges.iter().map(|(_, r, _)| *r))?;
        Ok(ranges)
    }

    /// Transition insertion: one spec per interior boundary.
    fn insert_transitions(
        plan: &RemixPlan,
        ranges: Vec<(ClipRef, TimeRange, ResolvedClip)>,
    ) -> Result<Vec<TimelineSegment>, TimelineRejection> {
        let spec = plan.transition;
        if ranges.len() > 1 {
            spec.validate()
                .map_err(|e| TimelineRejection::InvalidTransition(e.to_string()))?;
        }

        let count = ranges.len();
        let mut segments = Vec::with_capacity(count);
        for (index, (clip, range, source)) in ranges.into_iter().enumerate() {
            let has_next = index + 1 < count;
            let has_prev = index > 0;

            if (has_next || has_prev) && range.duration() < spec.duration {
                return Err(TimelineRejection::InvalidTransition(format!(
                    "segment {} lasts {:.3}s, shorter than the {:.3}s transition",
                    index,
                    range.duration(),
                    spec.duration
                )));
            }

            segments.push(TimelineSegment {
                segment: Segment {
                    source_clip: clip,
                    range,
                    transition_at_end: has_next.then_some(spec),
                },
                source,
                transition_at_start: has_prev.then_some(spec),
            });
        }
        Ok(segments)
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    /// Segment ranges in output order.
    pub fn ranges(&self) -> Vec<TimeRange> {
        self.segments.iter().map(|s| s.range()).collect()
    }

    /// Frames in the whole output.
    pub fn total_frames(&self) -> u64 {
        (self.total_duration * self.fps).round() as u64
    }

    /// Frame count per segment. Boundaries are quantised to the frame grid,
    /// so the counts always add up to [`Self::total_frames`].
    pub fn frame_counts(&self) -> Vec<u64> {
        let total = self.total_frames();
        let last = self.segments.len().saturating_sub(1);
        self.segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let start = ((s.range().start * self.fps).round() as u64).min(total);
                let end = if i == last {
                    total
                } else {
                    ((s.range().end * self.fps).round() as u64).min(total)
                };
                end.saturating_sub(start)
            })
            .collect()
    }
}

/// Ranges must start at 0, touch each other and end at `total`.
fn check_partition(
    total: f64,
    ranges: impl Iterator<Item = TimeRange>,
) -> Result<(), TimelineRejection> {
    let mut expected_start = 0.0;
    let mut last_end = 0.0;
    for (index, range) in ranges.enumerate() {
        if (range.start - expected_start).abs() > BOUNDARY_EPSILON || range.end <= range.start {
            return Err(TimelineRejection::Partition {
                index: index.saturating_sub(1),
                next: index,
            });
        }
        expected_start = range.end;
        last_end = range.end;
    }
    if (last_end - total).abs() > BOUNDARY_EPSILON {
        return Err(TimelineRejection::Partition { index: 0, next: 0 });
    }
    Ok(())
}
