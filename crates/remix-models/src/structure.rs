//! Structural description of a dance video.
//!
//! A [`VideoStructure`] is the tempo, the ordered section layout and the
//! timestamp of the highest-energy beat ("drop") of a source video. It is
//! validated once on construction and immutable afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Tolerance used when checking that consecutive sections touch.
pub const SECTION_EPSILON: f64 = 1e-6;

/// Musical role of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionLabel {
    Intro,
    Build,
    Drop,
    Verse,
    Chorus,
    Outro,
}

impl SectionLabel {
    /// All labels in canonical order.
    pub const ALL: &'static [SectionLabel] = &[
        SectionLabel::Intro,
        SectionLabel::Build,
        SectionLabel::Drop,
        SectionLabel::Verse,
        SectionLabel::Chorus,
        SectionLabel::Outro,
    ];

    /// Snake-case name used in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionLabel::Intro => "intro",
            SectionLabel::Build => "build",
            SectionLabel::Drop => "drop",
            SectionLabel::Verse => "verse",
            SectionLabel::Chorus => "chorus",
            SectionLabel::Outro => "outro",
        }
    }

    /// Capitalized tag as written into composer prompts.
    pub fn tag(&self) -> &'static str {
        match self {
            SectionLabel::Intro => "Intro",
            SectionLabel::Build => "Build",
            SectionLabel::Drop => "Drop",
            SectionLabel::Verse => "Verse",
            SectionLabel::Chorus => "Chorus",
            SectionLabel::Outro => "Outro",
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SectionLabel {
    type Err = ModelError;

    /// Lenient parse. Model output uses free-form tags such as
    /// "Drop/Chorus" or "Pre-Chorus"; the first alternative wins.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let head = lower
            .split(['/', '(', ',', '|'])
            .next()
            .unwrap_or_default()
            .trim();

        match head {
            "intro" | "opening" => Ok(SectionLabel::Intro),
            "build" | "build-up" | "buildup" | "build up" | "pre-chorus" | "prechorus"
            | "pre chorus" | "rise" => Ok(SectionLabel::Build),
            "drop" | "hook" | "climax" | "beat drop" => Ok(SectionLabel::Drop),
            "verse" => Ok(SectionLabel::Verse),
            "chorus" => Ok(SectionLabel::Chorus),
            "outro" | "ending" | "end" => Ok(SectionLabel::Outro),
            _ => Err(ModelError::UnknownLabel(s.to_string())),
        }
    }
}

/// One labelled span of the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub label: SectionLabel,
    /// Start in seconds (inclusive)
    pub start_ts: f64,
    /// End in seconds (exclusive)
    pub end_ts: f64,
    /// Free-text description of the beat that should accompany the section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
}

impl Section {
    pub fn new(label: SectionLabel, start_ts: f64, end_ts: f64) -> Self {
        Self {
            label,
            start_ts,
            end_ts,
            cue: None,
        }
    }

    /// Attach a beat description.
    pub fn with_cue(mut self, cue: impl Into<String>) -> Self {
        self.cue = Some(cue.into());
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    fn contains(&self, ts: f64) -> bool {
        ts >= self.start_ts && ts < self.end_ts
    }
}

/// Section as reported by an analysis model, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSection {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub beat_desc: Option<String>,
}

/// Tempo, section layout and drop timestamp of a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VideoStructureParts")]
pub struct VideoStructure {
    bpm: f64,
    sections: Vec<Section>,
    drop_ts: f64,
}

#[derive(Deserialize)]
struct VideoStructureParts {
    bpm: f64,
    sections: Vec<Section>,
    drop_ts: f64,
}

impl TryFrom<VideoStructureParts> for VideoStructure {
    type Error = ModelError;

    fn try_from(parts: VideoStructureParts) -> Result<Self, Self::Error> {
        Self::new(parts.bpm, parts.sections, parts.drop_ts)
    }
}

impl VideoStructure {
    /// Build a structure, checking every invariant.
    ///
    /// Sections must be non-empty, ordered, contiguous and non-overlapping,
    /// and `drop_ts` must fall inside exactly one of them. The last section
    /// is treated as closed so a drop on the final frame is accepted.
    pub fn new(bpm: f64, sections: Vec<Section>, drop_ts: f64) -> ModelResult<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ModelError::InvalidBpm(bpm));
        }
        if sections.is_empty() {
            return Err(ModelError::EmptySections);
        }

        for (index, section) in sections.iter().enumerate() {
            let valid = section.start_ts.is_finite()
                && section.end_ts.is_finite()
                && section.start_ts >= 0.0
                && section.end_ts > section.start_ts;
            if !valid {
                return Err(ModelError::InvalidSection {
                    index,
                    start: section.start_ts,
                    end: section.end_ts,
                });
            }
        }

        for (index, pair) in sections.windows(2).enumerate() {
            if (pair[1].start_ts - pair[0].end_ts).abs() > SECTION_EPSILON {
                return Err(ModelError::NonContiguous {
                    index: index + 1,
                    expected: pair[0].end_ts,
                    found: pair[1].start_ts,
                });
            }
        }

        let structure = Self {
            bpm,
            sections,
            drop_ts,
        };

        if !drop_ts.is_finite() || drop_ts < 0.0 || structure.section_index_at(drop_ts).is_none() {
            return Err(ModelError::DropOutsideSections(drop_ts));
        }

        Ok(structure)
    }

    /// Normalise loosely-structured analysis output into a valid structure.
    ///
    /// Sections are sorted by start, clamped to non-negative time and
    /// snapped so each one starts where the previous one ended. Spans left
    /// empty by the snapping are dropped. Unknown tags become `Verse`.
    /// When no drop timestamp was reported, the start of the first `Drop`
    /// section is used.
    pub fn from_analysis(
        bpm: Option<f64>,
        raw_sections: Vec<RawSection>,
        drop_ts: Option<f64>,
    ) -> ModelResult<Self> {
        let bpm = bpm.ok_or(ModelError::InvalidBpm(0.0))?;

        let mut raw: Vec<RawSection> = raw_sections
            .into_iter()
            .filter(|s| s.start.is_finite() && s.end.is_finite())
            .collect();
        raw.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut sections: Vec<Section> = Vec::with_capacity(raw.len());
        for r in raw {
            let start = match sections.last() {
                Some(prev) => prev.end_ts,
                None => r.start.max(0.0),
            };
            if r.end - start <= SECTION_EPSILON {
                continue;
            }

            let label = r.tag.parse().unwrap_or(SectionLabel::Verse);
            let mut section = Section::new(label, start, r.end);
            section.cue = r.beat_desc.filter(|d| !d.trim().is_empty());
            sections.push(section);
        }

        let drop_ts = drop_ts
            .or_else(|| {
                sections
                    .iter()
                    .find(|s| s.label == SectionLabel::Drop)
                    .map(|s| s.start_ts)
            })
            .ok_or(ModelError::DropOutsideSections(f64::NAN))?;

        Self::new(bpm, sections, drop_ts)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn drop_ts(&self) -> f64 {
        self.drop_ts
    }

    /// Start of the first section.
    pub fn start_ts(&self) -> f64 {
        self.sections.first().map(|s| s.start_ts).unwrap_or(0.0)
    }

    /// End of the last section.
    pub fn end_ts(&self) -> f64 {
        self.sections.last().map(|s| s.end_ts).unwrap_or(0.0)
    }

    /// Index of the section whose span contains `ts`.
    pub fn section_index_at(&self, ts: f64) -> Option<usize> {
        if let Some(i) = self.sections.iter().position(|s| s.contains(ts)) {
            return Some(i);
        }
        // Closed upper bound on the final section.
        let last = self.sections.len().checked_sub(1)?;
        ((ts - self.sections[last].end_ts).abs() <= SECTION_EPSILON).then_some(last)
    }

    /// Section containing the drop.
    pub fn drop_section(&self) -> &Section {
        // Construction guarantees the drop lies inside a section.
        let index = self.section_index_at(self.drop_ts).unwrap_or(0);
        &self.sections[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn three_sections() -> Vec<Section> {
        vec![
            Section::new(SectionLabel::Intro, 0.0, 2.5),
            Section::new(SectionLabel::Build, 2.5, 6.0),
            Section::new(SectionLabel::Drop, 6.0, 15.0),
        ]
    }

    #[test]
    fn test_valid_structure() {
        let s = VideoStructure::new(128.0, three_sections(), 6.0).unwrap();
        assert_eq!(s.bpm(), 128.0);
        assert_eq!(s.drop_section().label, SectionLabel::Drop);
        assert_eq!(s.end_ts(), 15.0);
    }

    #[test]
    fn test_rejects_non_positive_bpm() {
        let err = VideoStructure::new(0.0, three_sections(), 6.0).unwrap_err();
        assert_eq!(err, ModelError::InvalidBpm(0.0));
    }

    #[test]
    fn test_rejects_gap_between_sections() {
        let sections = vec![
            Section::new(SectionLabel::Intro, 0.0, 2.0),
            Section::new(SectionLabel::Drop, 2.5, 6.0),
        ];
        let err = VideoStructure::new(120.0, sections, 3.0).unwrap_err();
        assert!(matches!(err, ModelError::NonContiguous { index: 1, .. }));
    }

    #[test]
    fn test_rejects_overlap() {
        let sections = vec![
            Section::new(SectionLabel::Intro, 0.0, 3.0),
            Section::new(SectionLabel::Drop, 2.0, 6.0),
        ];
        assert!(VideoStructure::new(120.0, sections, 4.0).is_err());
    }

    #[test]
    fn test_rejects_drop_outside() {
        let err = VideoStructure::new(128.0, three_sections(), 15.5).unwrap_err();
        assert!(matches!(err, ModelError::DropOutsideSections(_)));
    }

    #[test]
    fn test_drop_on_final_boundary_is_accepted() {
        let s = VideoStructure::new(128.0, three_sections(), 15.0).unwrap();
        assert_eq!(s.section_index_at(15.0), Some(2));
    }

    #[test]
    fn test_boundary_belongs_to_later_section() {
        let s = VideoStructure::new(128.0, three_sections(), 1.0).unwrap();
        assert_eq!(s.section_index_at(2.5), Some(1));
        assert_eq!(s.section_index_at(6.0), Some(2));
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"bpm":128,"sections":[{"label":"intro","start_ts":0,"end_ts":4}],"drop_ts":9}"#;
        assert!(serde_json::from_str::<VideoStructure>(json).is_err());

        let json = r#"{"bpm":128,"sections":[{"label":"drop","start_ts":0,"end_ts":4}],"drop_ts":1}"#;
        let s: VideoStructure = serde_json::from_str(json).unwrap();
        assert_eq!(s.drop_ts(), 1.0);
    }

    #[test]
    fn test_label_parsing_is_lenient() {
        assert_eq!("Drop/Chorus".parse::<SectionLabel>().unwrap(), SectionLabel::Drop);
        assert_eq!("Pre-Chorus".parse::<SectionLabel>().unwrap(), SectionLabel::Build);
        assert_eq!(" OUTRO ".parse::<SectionLabel>().unwrap(), SectionLabel::Outro);
        assert!("bridge".parse::<SectionLabel>().is_err());
    }

    #[test]
    fn test_from_analysis_snaps_sections() {
        let raw = vec![
            RawSection {
                start: 2.4,
                end: 10.0,
                tag: "Chorus".into(),
                beat_desc: Some("high energy drop".into()),
            },
            RawSection {
                start: 0.0,
                end: 2.5,
                tag: "Intro".into(),
                beat_desc: None,
            },
            RawSection {
                start: 9.0,
                end: 9.5,
                tag: "Verse".into(),
                beat_desc: None,
            },
        ];

        let s = VideoStructure::from_analysis(Some(128.0), raw, Some(3.0)).unwrap();
        assert_eq!(s.sections().len(), 2);
        assert_eq!(s.sections()[1].start_ts, 2.5);
        assert_eq!(s.sections()[1].cue.as_deref(), Some("high energy drop"));
    }

    #[test]
    fn test_from_analysis_falls_back_to_drop_section() {
        let raw = vec![
            RawSection {
                start: 0.0,
                end: 4.0,
                tag: "Build".into(),
                beat_desc: None,
            },
            RawSection {
                start: 4.0,
                end: 8.0,
                tag: "Drop".into(),
                beat_desc: None,
            },
        ];
        let s = VideoStructure::from_analysis(Some(100.0), raw, None).unwrap();
        assert_eq!(s.drop_ts(), 4.0);
    }

    #[test]
    fn test_from_analysis_without_bpm_fails() {
        let raw = vec![RawSection {
            start: 0.0,
            end: 4.0,
            tag: "Drop".into(),
            beat_desc: None,
        }];
        assert!(VideoStructure::from_analysis(None, raw, Some(1.0)).is_err());
    }

    #[test]
    fn test_drop_in_exactly_one_section_over_random_layouts() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..500 {
            let count = rng.random_range(1..8);
            let mut cursor = rng.random_range(0.0..3.0);
            let mut sections = Vec::with_capacity(count);
            for _ in 0..count {
                let len = rng.random_range(0.05..12.0);
                let label = SectionLabel::ALL[rng.random_range(0..SectionLabel::ALL.len())];
                sections.push(Section::new(label, cursor, cursor + len));
                cursor += len;
            }

            let first = sections[0].start_ts;
            let drop_ts = rng.random_range(first..cursor);
            let structure = VideoStructure::new(120.0, sections.clone(), drop_ts).unwrap();

            let containing = structure
                .sections()
                .iter()
                .filter(|s| drop_ts >= s.start_ts && drop_ts < s.end_ts)
                .count();
            assert_eq!(containing, 1, "drop {drop_ts} in {sections:?}");

            let outside = cursor + rng.random_range(0.01..5.0);
            assert!(VideoStructure::new(120.0, sections, outside).is_err());
        }
    }
}
