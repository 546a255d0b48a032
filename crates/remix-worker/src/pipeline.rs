//! The remix pipeline.
//!
//! One run executes its stages in order, each consuming the previous one's
//! output:
//!
//! 1. fetch and probe the clips, then validate the timeline
//! 2. analyze the source clip's structure
//! 3. build the music request and compose a track
//! 4. detect the track's drop
//! 5. align the track to the video drop
//! 6. render the timeline and mux the aligned track
//! 7. publish the output and write the run record
//!
//! The cancel flag is checked between stages and handed to the media engine,
//! which stops a running FFmpeg process when it flips. Nothing is published
//! once it is set.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, Instrument};

use remix_firestore::RunRecord;
use remix_media::{ClipCatalog, MuxOptions, RemixTimeline, RenderSettings, VideoInfo};
use remix_models::{
    build_music_request, compute_offset, AlignmentPlan, AlignmentStatus, ClipRef, MusicStyle,
    Offset, PlanEntry, RemixPlan, RunId,
};

use crate::config::RunConfig;
use crate::error::{RunError, RunResult};
use crate::logging::RunLogger;
use crate::metrics::{record_run, record_stage};
use crate::ports::{DropDetection, Services};

/// Where a clip's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipSource {
    /// A readable local file
    Path(PathBuf),
    /// A URI understood by the object store
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInput {
    pub clip: ClipRef,
    pub source: ClipSource,
}

/// One remix to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub run_id: RunId,
    /// The original clip. It is analyzed and sets the output length.
    pub original: ClipInput,
    /// Style variants of the original.
    #[serde(default)]
    pub variants: Vec<ClipInput>,
    /// Output shares. Empty means an equal split over the original
    /// followed by each variant.
    #[serde(default)]
    pub plan: Vec<PlanEntry>,
    /// Overrides the configured style for this run.
    #[serde(default)]
    pub style: Option<MusicStyle>,
}

impl RunRequest {
    pub fn new(original: ClipInput) -> Self {
        Self {
            run_id: RunId::new(),
            original,
            variants: Vec::new(),
            plan: Vec::new(),
            style: None,
        }
    }

    pub fn with_variants(mut self, variants: Vec<ClipInput>) -> Self {
        self.variants = variants;
        self
    }

    fn clips(&self) -> impl Iterator<Item = &ClipInput> {
        std::iter::once(&self.original).chain(self.variants.iter())
    }

    fn remix_plan(&self, total_duration: f64) -> RemixPlan {
        if !self.plan.is_empty() {
            return RemixPlan::new(total_duration, self.plan.clone());
        }
        RemixPlan::equal_split(total_duration, self.clips().map(|c| c.clip.clone()))
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub output_uri: String,
    pub offset: Option<Offset>,
    pub alignment_status: AlignmentStatus,
    pub alignment_plan: AlignmentPlan,
    pub video_drop_ts: f64,
    pub audio_drop_ts: Option<f64>,
    /// Output length in seconds
    pub duration: f64,
}

/// Clips resolved to local files, measured and validated.
struct PreparedClips {
    timeline: RemixTimeline,
    settings: RenderSettings,
    original: PathBuf,
}

pub struct RemixPipeline {
    services: Services,
    config: RunConfig,
}

impl RemixPipeline {
    pub fn new(services: Services, config: RunConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// The run's scratch directory is removed afterwards whatever the
    /// outcome.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: watch::Receiver<bool>,
    ) -> RunResult<RunReport> {
        let logger = RunLogger::new(&request.run_id);
        let work_dir = self.config.work_dir.join(request.run_id.as_str());

        let result = self
            .execute(request, &work_dir, &cancel, &logger)
            .instrument(logger.create_span())
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                logger.log_warning(&format!("Failed to remove {}: {}", work_dir.display(), e));
            }
        }

        match &result {
            Ok(report) => {
                record_run(if report.alignment_status.is_applied() {
                    "synced"
                } else {
                    "unsynced"
                });
                info!(
                    run_id = %report.run_id,
                    output_uri = %report.output_uri,
                    alignment = %report.alignment_status,
                    "Run completed"
                );
            }
            Err(e) => {
                record_run(e.outcome());
                logger.log_error(&e.to_string());
            }
        }
        result
    }

    async fn execute(
        &self,
        request: &RunRequest,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
        logger: &RunLogger,
    ) -> RunResult<RunReport> {
        tokio::fs::create_dir_all(work_dir).await?;
        let style = request.style.clone().unwrap_or_else(|| self.config.style.clone());

        ensure_active(cancel)?;
        let prepared = self
            .timed(logger, "prepare", self.prepare(request, work_dir))
            .await?;
        let total_duration = prepared.timeline.total_duration();

        ensure_active(cancel)?;
        let structure = self
            .timed(
                logger,
                "analyze",
                self.services.analyzer.analyze(&prepared.original, &style),
            )
            .await?;

        let music_request = build_music_request(&structure, style);

        ensure_active(cancel)?;
        let track = self
            .timed(logger, "generate", self.services.composer.compose(&music_request))
            .await?;
        let track_path = work_dir.join("track.mp3");
        tokio::fs::write(&track_path, &track).await?;

        ensure_active(cancel)?;
        let detection = self
            .timed(logger, "detect", self.services.detector.detect(&track_path))
            .await?;

        let (offset, plan, audio_drop_ts) = match detection {
            DropDetection::Detected(audio) => {
                let offset = compute_offset(&structure, &audio);
                let plan = AlignmentPlan::for_offset(&offset, &audio, total_duration);
                (Some(offset), plan, Some(audio.drop_ts()))
            }
            DropDetection::NoDetectableDrop => (None, AlignmentPlan::no_drop(), None),
        };
        if let AlignmentPlan::Passthrough { reason } = plan {
            logger
                .stage("align")
                .log_warning(&format!("Alignment skipped: {}", reason.as_str()));
        }

        ensure_active(cancel)?;
        let aligned = self
            .timed(
                logger,
                "align",
                self.services
                    .media
                    .align(&track_path, &work_dir.join("aligned.wav"), &plan, cancel),
            )
            .await?;

        ensure_active(cancel)?;
        let rendered = self
            .timed(
                logger,
                "assemble",
                self.services.media.render(
                    &prepared.timeline,
                    &prepared.settings,
                    &work_dir.join("silent.mp4"),
                    cancel,
                ),
            )
            .await?;

        ensure_active(cancel)?;
        let mux_options = MuxOptions {
            fade_out: self.config.fade_out,
            ..MuxOptions::default()
        };
        let output = self
            .timed(
                logger,
                "mux",
                self.services.media.mux(
                    &rendered.path,
                    &aligned.path,
                    &work_dir.join("remix.mp4"),
                    total_duration,
                    &mux_options,
                    cancel,
                ),
            )
            .await?;

        ensure_active(cancel)?;
        let bytes = tokio::fs::read(&output).await?;
        let key = self.config.output_key(request.run_id.as_str());
        let output_uri = self
            .timed(
                logger,
                "publish",
                self.services.store.put(bytes, &key, "video/mp4"),
            )
            .await?;

        let record = RunRecord {
            offset,
            alignment_status: aligned.status,
            output_uri: output_uri.clone(),
        };
        self.timed(
            logger,
            "record",
            self.services.records.upsert(request.run_id.as_str(), &record),
        )
        .await?;

        Ok(RunReport {
            run_id: request.run_id.clone(),
            output_uri,
            offset,
            alignment_status: aligned.status,
            alignment_plan: plan,
            video_drop_ts: structure.drop_ts(),
            audio_drop_ts,
            duration: total_duration,
        })
    }

    /// Resolve every clip to a local file, measure it and build the
    /// timeline. An invalid plan fails here, before any external call.
    async fn prepare(&self, request: &RunRequest, work_dir: &Path) -> RunResult<PreparedClips> {
        let mut seen = HashSet::new();
        for input in request.clips() {
            if !seen.insert(&input.clip) {
                return Err(RunError::invalid_request(format!(
                    "clip '{}' appears more than once",
                    input.clip
                )));
            }
        }

        let mut catalog = ClipCatalog::new();
        let mut original: Option<(PathBuf, VideoInfo)> = None;
        for (index, input) in request.clips().enumerate() {
            let path = self.materialize(input, index, work_dir).await?;
            let info = self.services.media.probe_video(&path).await?;
            catalog.insert(input.clip.clone(), &path, info.duration);
            if index == 0 {
                original = Some((path, info));
            }
        }
        let (original, original_info) = original
            .ok_or_else(|| RunError::invalid_request("run has no original clip"))?;

        let total_duration = if self.config.cap_to_shortest {
            catalog
                .shortest_duration()
                .map_or(original_info.duration, |shortest| {
                    shortest.min(original_info.duration)
                })
        } else {
            original_info.duration
        };

        let settings = RenderSettings::from_video(&original_info, self.config.fps_override);
        let plan = request
            .remix_plan(total_duration)
            .with_transition(self.config.transition);
        let timeline = RemixTimeline::build(&plan, &catalog, settings.fps)?;

        info!(
            clips = catalog.len(),
            segments = timeline.segments().len(),
            total_duration,
            fps = settings.fps,
            "Timeline validated"
        );
        Ok(PreparedClips {
            timeline,
            settings,
            original,
        })
    }

    async fn materialize(&self, input: &ClipInput, index: usize, work_dir: &Path) -> RunResult<PathBuf> {
        match &input.source {
            ClipSource::Path(path) => {
                if tokio::fs::try_exists(path).await? {
                    Ok(path.clone())
                } else {
                    Err(RunError::invalid_request(format!(
                        "clip '{}' not found at {}",
                        input.clip,
                        path.display()
                    )))
                }
            }
            ClipSource::Object(uri) => {
                let bytes = self.services.store.get(uri).await?;
                let path = work_dir.join(format!("clip-{}.mp4", index));
                tokio::fs::write(&path, bytes).await?;
                Ok(path)
            }
        }
    }

    async fn timed<T>(
        &self,
        logger: &RunLogger,
        stage: &'static str,
        work: impl Future<Output = RunResult<T>>,
    ) -> RunResult<T> {
        let logger = logger.stage(stage);
        logger.log_start(stage);
        let started = Instant::now();
        let result = work.await;
        record_stage(stage, started.elapsed());
        if result.is_ok() {
            logger.log_completion(&format!("{:.1}s", started.elapsed().as_secs_f64()));
        }
        result
    }
}

fn ensure_active(cancel: &watch::Receiver<bool>) -> RunResult<()> {
    if *cancel.borrow() {
        Err(RunError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(clip: &str) -> ClipInput {
        ClipInput {
            clip: ClipRef::new(clip),
            source: ClipSource::Path(PathBuf::from(format!("/clips/{}.mp4", clip))),
        }
    }

    #[test]
    fn test_default_plan_starts_with_original() {
        let request =
            RunRequest::new(input("original")).with_variants(vec![input("anime"), input("clay")]);
        let plan = request.remix_plan(9.0);

        let clips: Vec<&str> = plan.entries.iter().map(|e| e.clip.as_str()).collect();
        assert_eq!(clips, ["original", "anime", "clay"]);
        assert!(plan.entries.iter().all(|e| (e.fraction - 1.0 / 3.0).abs() < 1e-9));
        assert!((plan.fraction_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_plan_without_variants_uses_original() {
        let plan = RunRequest::new(input("original")).remix_plan(8.0);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].clip.as_str(), "original");
        assert_eq!(plan.total_duration, 8.0);
    }

    #[test]
    fn test_request_from_json() {
        let request: RunRequest = serde_json::from_str(
            r#"{
                "run_id": "run-7",
                "original": {"clip": "original", "source": {"path": "/clips/o.mp4"}},
                "variants": [{"clip": "anime", "source": {"object": "s3://clips/anime.mp4"}}],
                "style": {"kind": "japanese_phonk"}
            }"#,
        )
        .unwrap();

        assert_eq!(request.run_id.as_str(), "run-7");
        assert_eq!(
            request.variants[0].source,
            ClipSource::Object("s3://clips/anime.mp4".into())
        );
        assert_eq!(request.style, Some(MusicStyle::JapanesePhonk));
        assert!(request.plan.is_empty());
    }

    #[test]
    fn test_ensure_active() {
        let (tx, rx) = watch::channel(false);
        assert!(ensure_active(&rx).is_ok());
        tx.send(true).unwrap();
        assert!(matches!(ensure_active(&rx), Err(RunError::Cancelled)));
    }
}
