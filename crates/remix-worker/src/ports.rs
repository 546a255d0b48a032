//! Collaborator traits used by the pipeline.
//!
//! The pipeline only talks to these traits. [`crate::adapters`] implements
//! them over the Gemini, MiniMax, S3, Firestore and FFmpeg clients; tests
//! substitute in-memory fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use remix_firestore::RunRecord;
use remix_media::{AlignedTrack, MuxOptions, RemixTimeline, RenderOutput, RenderSettings, VideoInfo};
use remix_models::{AlignmentPlan, AudioStructure, MusicRequest, MusicStyle, VideoStructure};

use crate::error::RunResult;

/// Result of asking for a track's drop.
#[derive(Debug, Clone, PartialEq)]
pub enum DropDetection {
    Detected(AudioStructure),
    /// The track has no drop; the run keeps the track unmodified.
    NoDetectableDrop,
}

#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    async fn analyze(&self, video: &Path, style: &MusicStyle) -> RunResult<VideoStructure>;
}

#[async_trait]
pub trait MusicComposer: Send + Sync {
    /// Audio bytes of a track for `request`.
    async fn compose(&self, request: &MusicRequest) -> RunResult<Vec<u8>>;
}

#[async_trait]
pub trait AudioDropDetector: Send + Sync {
    async fn detect(&self, audio: &Path) -> RunResult<DropDetection>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return its URI.
    async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> RunResult<String>;

    async fn get(&self, uri: &str) -> RunResult<Vec<u8>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write the run's fields, leaving every other field untouched.
    async fn upsert(&self, run_id: &str, record: &RunRecord) -> RunResult<()>;
}

/// Media probing and rendering.
///
/// Long-running operations stop early once `cancel` flips to true.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn probe_video(&self, path: &Path) -> RunResult<VideoInfo>;

    async fn render(
        &self,
        timeline: &RemixTimeline,
        settings: &RenderSettings,
        output: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<RenderOutput>;

    async fn align(
        &self,
        input: &Path,
        output: &Path,
        plan: &AlignmentPlan,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<AlignedTrack>;

    /// Mux `audio` onto `video`; the result is exactly `duration` long.
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        duration: f64,
        options: &MuxOptions,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<PathBuf>;
}

/// One implementation per collaborator, shared by every run.
#[derive(Clone)]
pub struct Services {
    pub analyzer: Arc<dyn VideoAnalyzer>,
    pub composer: Arc<dyn MusicComposer>,
    pub detector: Arc<dyn AudioDropDetector>,
    pub media: Arc<dyn MediaEngine>,
    pub store: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
}
