//! Audio drop detection.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use remix_models::AudioStructure;

use crate::analyzer::TimestampResponse;
use crate::error::{AiError, AiResult};
use crate::gemini::GeminiClient;
use crate::json::parse_embedded;

pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_secs(180);

const AUDIO_DROP_PROMPT: &str =
    "Identify timestamp (ms) of the main Beat Drop/Chorus start. JSON: {\"timestamp_ms\": 1000}";

/// Finds the main drop of a generated track.
pub struct DropDetector {
    gemini: GeminiClient,
    timeout: Duration,
}

impl DropDetector {
    pub fn new(gemini: GeminiClient, timeout: Duration) -> Self {
        Self { gemini, timeout }
    }

    /// Detect the drop of `audio`, a track of `duration` seconds.
    ///
    /// An answer without a usable timestamp, or one past the end of the
    /// track, is `NoDetectableDrop`. That outcome is final for the track.
    pub async fn detect(&self, audio: &Path, duration: f64) -> AiResult<AudioStructure> {
        let text = tokio::time::timeout(
            self.timeout,
            self.gemini
                .generate_with_file("detect_audio_drop", audio, AUDIO_DROP_PROMPT),
        )
        .await
        .map_err(|_| AiError::AnalysisTimeout(self.timeout))??;

        let answer: TimestampResponse = match parse_embedded(&text) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Unparseable drop answer: {}", e);
                return Err(AiError::no_detectable_drop(e.to_string()));
            }
        };

        let drop_ts = answer
            .seconds()
            .ok_or_else(|| AiError::no_detectable_drop("no timestamp reported"))?;

        let structure = AudioStructure::new(drop_ts, duration)
            .map_err(|e| AiError::no_detectable_drop(e.to_string()))?;

        info!(
            drop_ts = structure.drop_ts(),
            duration = structure.duration(),
            "Audio drop detected"
        );
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::tests::{media_file, mount_file_api, test_client, text_response};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer};

    async fn detector_answering(server: &MockServer, answer: &str) -> DropDetector {
        mount_file_api(server, "audio/mp3").await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(text_response(answer))
            .mount(server)
            .await;
        DropDetector::new(test_client(server, &["k"]), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_detects_drop() {
        let server = MockServer::start().await;
        let detector = detector_answering(&server, "{\"timestamp_ms\": 10500}").await;
        let dir = tempfile::tempdir().unwrap();
        let track = media_file(&dir, "track.mp3");

        let audio = detector.detect(&track, 40.0).await.unwrap();
        assert_eq!(audio.drop_ts(), 10.5);
        assert_eq!(audio.duration(), 40.0);
    }

    #[tokio::test]
    async fn test_null_timestamp_is_no_drop() {
        let server = MockServer::start().await;
        let detector = detector_answering(&server, "{\"timestamp_ms\": null}").await;
        let dir = tempfile::tempdir().unwrap();
        let track = media_file(&dir, "flat.mp3");

        let err = detector.detect(&track, 40.0).await.unwrap_err();
        assert!(matches!(err, AiError::NoDetectableDrop(_)));
    }

    #[tokio::test]
    async fn test_drop_past_end_is_no_drop() {
        let server = MockServer::start().await;
        let detector = detector_answering(&server, "{\"timestamp_ms\": 45000}").await;
        let dir = tempfile::tempdir().unwrap();
        let track = media_file(&dir, "short.mp3");

        let err = detector.detect(&track, 40.0).await.unwrap_err();
        assert!(matches!(err, AiError::NoDetectableDrop(_)));
    }
}
