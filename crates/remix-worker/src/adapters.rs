//! Port implementations over the service clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use remix_ai::{AiError, DropDetector, GeminiClient, MinimaxClient, StructureAnalyzer};
use remix_firestore::{FirestoreClient, RunRecord, RunRecordStore};
use remix_media::{
    align_audio, mux_audio, probe_audio, probe_video, render_timeline, AlignedTrack, FfmpegRunner,
    MuxOptions, RemixTimeline, RenderOutput, RenderSettings, VideoInfo,
};
use remix_models::{AlignmentPlan, MusicRequest, MusicStyle, VideoStructure};
use remix_storage::BucketClient;

use crate::config::RunConfig;
use crate::error::{RunError, RunResult};
use crate::ports::{
    AudioDropDetector, DropDetection, MediaEngine, MusicComposer, ObjectStore, RecordStore,
    Services, VideoAnalyzer,
};

#[async_trait]
impl VideoAnalyzer for StructureAnalyzer {
    async fn analyze(&self, video: &Path, style: &MusicStyle) -> RunResult<VideoStructure> {
        StructureAnalyzer::analyze(self, video, style)
            .await
            .map_err(RunError::from_analysis)
    }
}

#[async_trait]
impl MusicComposer for MinimaxClient {
    async fn compose(&self, request: &MusicRequest) -> RunResult<Vec<u8>> {
        MinimaxClient::compose(self, request)
            .await
            .map_err(RunError::from_generation)
    }
}

/// Drop detection for generated tracks, measuring the track first.
#[async_trait]
impl AudioDropDetector for DropDetector {
    async fn detect(&self, audio: &Path) -> RunResult<DropDetection> {
        let info = probe_audio(audio).await?;
        match DropDetector::detect(self, audio, info.duration).await {
            Ok(structure) => Ok(DropDetection::Detected(structure)),
            Err(AiError::NoDetectableDrop(reason)) => {
                info!(reason = %reason, "Track has no detectable drop");
                Ok(DropDetection::NoDetectableDrop)
            }
            Err(e) => Err(RunError::from_analysis(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> RunResult<String> {
        let uri = BucketClient::put(self, data, key, content_type).await?;
        Ok(uri.to_string())
    }

    async fn get(&self, uri: &str) -> RunResult<Vec<u8>> {
        Ok(BucketClient::get(self, uri).await?)
    }
}

#[async_trait]
impl RecordStore for RunRecordStore {
    async fn upsert(&self, run_id: &str, record: &RunRecord) -> RunResult<()> {
        Ok(RunRecordStore::upsert(self, run_id, record).await?)
    }
}

/// FFmpeg-backed [`MediaEngine`].
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    /// Per-command timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn runner(&self, cancel: &watch::Receiver<bool>) -> FfmpegRunner {
        let runner = FfmpegRunner::new().with_cancel(cancel.clone());
        match self.timeout_secs {
            Some(secs) => runner.with_timeout(secs),
            None => runner,
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe_video(&self, path: &Path) -> RunResult<VideoInfo> {
        Ok(probe_video(path).await?)
    }

    async fn render(
        &self,
        timeline: &RemixTimeline,
        settings: &RenderSettings,
        output: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<RenderOutput> {
        Ok(render_timeline(timeline, settings, output, &self.runner(cancel)).await?)
    }

    async fn align(
        &self,
        input: &Path,
        output: &Path,
        plan: &AlignmentPlan,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<AlignedTrack> {
        Ok(align_audio(input, output, plan, &self.runner(cancel)).await?)
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        duration: f64,
        options: &MuxOptions,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<PathBuf> {
        mux_audio(video, audio, output, duration, options, &self.runner(cancel)).await?;
        Ok(output.to_path_buf())
    }
}

impl Services {
    /// Build every collaborator from the environment.
    ///
    /// The analyzer and the drop detector share one Gemini client, so both
    /// draw from the same credential pool.
    pub fn from_env(config: &RunConfig) -> anyhow::Result<Self> {
        let gemini = GeminiClient::from_env().context("Gemini client")?;
        let composer = MinimaxClient::from_env().context("MiniMax client")?;
        let store = BucketClient::from_env().context("object storage client")?;
        let firestore = FirestoreClient::from_env().context("Firestore client")?;

        info!(
            gemini_keys = gemini.pool().len(),
            minimax_keys = composer.pool().len(),
            bucket = store.bucket(),
            "Service clients ready"
        );

        Ok(Self {
            analyzer: Arc::new(StructureAnalyzer::new(gemini.clone(), config.analysis_timeout)),
            detector: Arc::new(DropDetector::new(gemini, config.detection_timeout)),
            composer: Arc::new(composer),
            media: Arc::new(FfmpegEngine::new()),
            store: Arc::new(store),
            records: Arc::new(RunRecordStore::new(firestore)),
        })
    }
}
