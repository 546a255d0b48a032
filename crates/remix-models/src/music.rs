//! Music generation requests.
//!
//! [`build_music_request`] is a pure function of a [`VideoStructure`] and a
//! [`MusicStyle`]. The same inputs always produce the same request.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::structure::VideoStructure;

/// Style of the generated soundtrack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MusicStyle {
    #[default]
    KpopDance,
    JapanesePhonk,
    Custom {
        description: String,
    },
}

impl MusicStyle {
    /// Style description appended to the composer prompt.
    pub fn description(&self) -> &str {
        match self {
            MusicStyle::KpopDance => {
                "High energy K-Pop dance music, punchy drums, bright synths, catchy hooks, clean production."
            }
            MusicStyle::JapanesePhonk => {
                "Japanese Phonk style, high energy drift phonk, melodic cowbells, anime racing aesthetic, clean production."
            }
            MusicStyle::Custom { description } => description,
        }
    }

    /// Extra instruction for the structural video analysis.
    pub fn analysis_instruction(&self) -> &str {
        match self {
            MusicStyle::KpopDance => "Analyze the dance for K-Pop choreography hits.",
            MusicStyle::JapanesePhonk => {
                "Analyze the dance for hard-hitting drift phonk accents and bass drops."
            }
            MusicStyle::Custom { .. } => {
                "Analyze the dance for the moves that carry the most energy."
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MusicStyle::KpopDance => "kpop_dance",
            MusicStyle::JapanesePhonk => "japanese_phonk",
            MusicStyle::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for MusicStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MusicStyle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kpop_dance" | "kpop" | "k-pop" => Ok(MusicStyle::KpopDance),
            "japanese_phonk" | "phonk" => Ok(MusicStyle::JapanesePhonk),
            other => match other.strip_prefix("custom:") {
                Some(desc) if !desc.trim().is_empty() => Ok(MusicStyle::Custom {
                    description: s.trim()["custom:".len()..].trim().to_string(),
                }),
                _ => Err(ModelError::UnknownStyle(s.to_string())),
            },
        }
    }
}

/// One tagged segment of the requested track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedSection {
    pub tag: String,
    /// Duration in seconds, always positive
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
}

/// Request sent to the external composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MusicRequest {
    pub bpm: f64,
    pub section_plan: Vec<PlannedSection>,
    pub style: MusicStyle,
}

/// Map a video structure onto a music request.
///
/// Each section becomes one planned section of matching duration, in order.
pub fn build_music_request(structure: &VideoStructure, style: MusicStyle) -> MusicRequest {
    let section_plan = structure
        .sections()
        .iter()
        .map(|s| PlannedSection {
            tag: s.label.tag().to_string(),
            duration: s.duration(),
            cue: s.cue.clone(),
        })
        .collect();

    MusicRequest {
        bpm: structure.bpm(),
        section_plan,
        style,
    }
}

impl MusicRequest {
    /// Total planned length in seconds.
    pub fn total_duration(&self) -> f64 {
        self.section_plan.iter().map(|s| s.duration).sum()
    }

    /// Planned sections with cumulative `(start, end)` offsets.
    pub fn timed_sections(&self) -> impl Iterator<Item = (f64, f64, &PlannedSection)> {
        self.section_plan.iter().scan(0.0_f64, |cursor, section| {
            let start = *cursor;
            *cursor += section.duration;
            Some((start, *cursor, section))
        })
    }

    /// Composer prompt text.
    pub fn prompt(&self) -> String {
        let mut prompt = format!("A high-quality track at {} BPM. Structure: ", format_num(self.bpm));
        for (start, end, section) in self.timed_sections() {
            prompt.push_str(&format!(
                "[{} {}-{}s] {}; ",
                section.tag,
                format_num(start),
                format_num(end),
                section.cue.as_deref().unwrap_or_default()
            ));
        }
        prompt.push_str(self.style.description());
        prompt
    }

    /// Lyrics sheet describing the instrumental layout.
    pub fn lyrics(&self) -> String {
        if self.section_plan.is_empty() {
            return "[Instrumental]".to_string();
        }

        let mut lyrics = String::new();
        for (start, end, section) in self.timed_sections() {
            lyrics.push_str(&format!(
                "[{}] ({}s-{}s)\n(Instrumental: {})\n",
                section.tag,
                format_num(start),
                format_num(end),
                section.cue.as_deref().unwrap_or_default()
            ));
        }
        lyrics
    }
}

/// Millisecond precision without trailing zeros.
fn format_num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{}", rounded)
}
