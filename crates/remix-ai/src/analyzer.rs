//! Structural video analyzer.
//!
//! Produces a [`VideoStructure`] for a dance video: tempo, energy sections
//! and the drop timestamp. The drop is refined with a second, narrower
//! question about the most energetic hit; when that answer is missing or
//! falls outside the sections, the start of the first drop section is used.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use remix_models::{MusicStyle, RawSection, VideoStructure};

use crate::error::{AiError, AiResult};
use crate::gemini::GeminiClient;
use crate::json::parse_embedded;

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(300);

const STRUCTURE_INSTRUCTION: &str = "Analyze the dance video precisely. \
Determine the BPM and break the choreography down into musical sections based on energy. \
For each section, specify the Start Time, End Time, Tag (Intro, Verse, Build, Drop/Chorus), \
and a detailed description of the beat/music that should accompany it. \
The 'First Hard Beat' or 'Drop' must align with the most energetic move.";

const STRUCTURE_FORMAT: &str = r#"

Return ONLY valid JSON in this format:
{
  "bpm": 128,
  "sections": [
    {"start": 0.0, "end": 2.5, "tag": "Intro", "beat_desc": "melodic sequence"},
    {"start": 2.5, "end": 10.0, "tag": "Chorus", "beat_desc": "high energy drop"}
  ]
}"#;

const VIDEO_DROP_PROMPT: &str = "Identify timestamp (ms) of the main energetic Dance Drop or First Hard Hit. JSON: {\"timestamp_ms\": 2000}";

#[derive(Debug, Deserialize)]
struct StructureResponse {
    bpm: Option<f64>,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimestampResponse {
    pub timestamp_ms: Option<f64>,
}

impl TimestampResponse {
    /// The timestamp in seconds, if it is a usable number.
    pub fn seconds(&self) -> Option<f64> {
        self.timestamp_ms
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms / 1000.0)
    }
}

pub struct StructureAnalyzer {
    gemini: GeminiClient,
    timeout: Duration,
    refine_drop: bool,
}

impl StructureAnalyzer {
    pub fn new(gemini: GeminiClient, timeout: Duration) -> Self {
        Self {
            gemini,
            timeout,
            refine_drop: true,
        }
    }

    /// Skip the second drop question and use the first drop section.
    pub fn with_drop_refinement(mut self, enabled: bool) -> Self {
        self.refine_drop = enabled;
        self
    }

    pub fn structure_prompt(style: &MusicStyle) -> String {
        format!(
            "{} {}{}",
            STRUCTURE_INSTRUCTION,
            style.analysis_instruction(),
            STRUCTURE_FORMAT
        )
    }

    /// Analyze `video` within the configured time budget.
    ///
    /// Fails with `AnalysisTimeout` past the budget, with `PoolExhausted`
    /// when no key can serve the request, and with `AnalysisUnavailable`
    /// for everything else.
    pub async fn analyze(&self, video: &Path, style: &MusicStyle) -> AiResult<VideoStructure> {
        match tokio::time::timeout(self.timeout, self.analyze_inner(video, style)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::AnalysisTimeout(self.timeout)),
        }
    }

    async fn analyze_inner(&self, video: &Path, style: &MusicStyle) -> AiResult<VideoStructure> {
        let prompt = Self::structure_prompt(style);
        let text = self
            .gemini
            .generate_with_file("analyze_structure", video, &prompt)
            .await
            .map_err(unavailable)?;

        let parsed: StructureResponse =
            parse_embedded(&text).map_err(|e| AiError::analysis_unavailable(e.to_string()))?;

        let refined = if self.refine_drop {
            self.video_drop(video).await?
        } else {
            None
        };

        let structure = match refined {
            Some(drop_ts) => {
                VideoStructure::from_analysis(parsed.bpm, parsed.sections.clone(), Some(drop_ts))
                    .or_else(|e| {
                        warn!(drop_ts, "Refined drop rejected ({}), using drop section", e);
                        VideoStructure::from_analysis(parsed.bpm, parsed.sections, None)
                    })
            }
            None => VideoStructure::from_analysis(parsed.bpm, parsed.sections, None),
        }
        .map_err(|e| AiError::analysis_unavailable(e.to_string()))?;

        info!(
            bpm = structure.bpm(),
            sections = structure.sections().len(),
            drop_ts = structure.drop_ts(),
            "Video structure analyzed"
        );
        Ok(structure)
    }

    async fn video_drop(&self, video: &Path) -> AiResult<Option<f64>> {
        match self
            .gemini
            .generate_with_file("detect_video_drop", video, VIDEO_DROP_PROMPT)
            .await
        {
            Ok(text) => Ok(parse_embedded::<TimestampResponse>(&text)
                .ok()
                .and_then(|r| r.seconds())),
            Err(e) if e.is_pool_exhausted() => Err(e),
            Err(e) => {
                warn!("Video drop refinement failed: {}", e);
                Ok(None)
            }
        }
    }
}

fn unavailable(err: AiError) -> AiError {
    if err.is_pool_exhausted() {
        err
    } else {
        AiError::analysis_unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::tests::{media_file, mount_file_api, test_client, text_response};
    use remix_models::SectionLabel;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer};

    const STRUCTURE_JSON: &str = r#"```json
{"bpm": 128, "sections": [
  {"start": 0.0, "end": 4.0, "tag": "Intro", "beat_desc": "soft pads"},
  {"start": 4.0, "end": 10.0, "tag": "Build", "beat_desc": "rising snare"},
  {"start": 10.0, "end": 20.0, "tag": "Drop/Chorus", "beat_desc": "hard 808"}
]}
```"#;

    async fn mount_answers(server: &MockServer, structure: &str, drop: &str) {
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(body_string_contains("Determine the BPM"))
            .respond_with(text_response(structure))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(body_string_contains("First Hard Hit"))
            .respond_with(text_response(drop))
            .mount(server)
            .await;
    }

    #[test]
    fn test_prompt_includes_style_and_format() {
        let prompt = StructureAnalyzer::structure_prompt(&MusicStyle::JapanesePhonk);
        assert!(prompt.starts_with("Analyze the dance video precisely."));
        assert!(prompt.contains("drift phonk"));
        assert!(prompt.contains("\"beat_desc\""));
    }

    #[tokio::test]
    async fn test_refined_drop_is_used() {
        let server = MockServer::start().await;
        mount_file_api(&server, "video/mp4").await;
        mount_answers(&server, STRUCTURE_JSON, "{\"timestamp_ms\": 12000}").await;

        let dir = tempfile::tempdir().unwrap();
        let video = media_file(&dir, "dance.mp4");
        let analyzer = StructureAnalyzer::new(test_client(&server, &["k"]), Duration::from_secs(5));

        let structure = analyzer.analyze(&video, &MusicStyle::default()).await.unwrap();
        assert_eq!(structure.bpm(), 128.0);
        assert_eq!(structure.sections().len(), 3);
        assert_eq!(structure.sections()[2].label, SectionLabel::Drop);
        assert_eq!(structure.drop_ts(), 12.0);
    }

    #[tokio::test]
    async fn test_out_of_span_drop_falls_back_to_drop_section() {
        let server = MockServer::start().await;
        mount_file_api(&server, "video/mp4").await;
        mount_answers(&server, STRUCTURE_JSON, "{\"timestamp_ms\": 95000}").await;

        let dir = tempfile::tempdir().unwrap();
        let video = media_file(&dir, "dance.mp4");
        let analyzer = StructureAnalyzer::new(test_client(&server, &["k"]), Duration::from_secs(5));

        let structure = analyzer.analyze(&video, &MusicStyle::default()).await.unwrap();
        assert_eq!(structure.drop_ts(), 10.0);
    }

    #[tokio::test]
    async fn test_empty_sections_are_unavailable() {
        let server = MockServer::start().await;
        mount_file_api(&server, "video/mp4").await;
        mount_answers(&server, "{\"bpm\": 120, \"sections\": []}", "{\"timestamp_ms\": null}").await;

        let dir = tempfile::tempdir().unwrap();
        let video = media_file(&dir, "static.mp4");
        let analyzer = StructureAnalyzer::new(test_client(&server, &["k"]), Duration::from_secs(5));

        let err = analyzer.analyze(&video, &MusicStyle::default()).await.unwrap_err();
        assert!(matches!(err, AiError::AnalysisUnavailable(_)));
    }

    #[tokio::test]
    async fn test_slow_analysis_times_out() {
        let server = MockServer::start().await;
        mount_file_api(&server, "video/mp4").await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(text_response(STRUCTURE_JSON).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let video = media_file(&dir, "dance.mp4");
        let analyzer = StructureAnalyzer::new(test_client(&server, &["k"]), Duration::from_millis(50));

        let err = analyzer.analyze(&video, &MusicStyle::default()).await.unwrap_err();
        assert!(matches!(err, AiError::AnalysisTimeout(_)));
    }
}
