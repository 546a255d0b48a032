//! End-to-end pipeline runs against in-memory collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use remix_firestore::RunRecord;
use remix_media::{
    AlignedTrack, MediaError, MuxOptions, RemixTimeline, RenderOutput, RenderSettings, VideoInfo,
};
use remix_models::{
    AlignmentPlan, AlignmentStatus, AudioStructure, ClipRef, Direction, MusicRequest, MusicStyle,
    PlanEntry, RunId, Section, SectionLabel, SkipReason, VideoStructure,
};
use remix_storage::StorageError;
use remix_worker::{
    AudioDropDetector, BatchExecutor, ClipInput, ClipSource, DropDetection, MediaEngine,
    MusicComposer, ObjectStore, RecordStore, RemixPipeline, RunConfig, RunError, RunRequest,
    RunResult, Services, VideoAnalyzer,
};

const TRACK: &[u8] = b"ID3 generated track";

struct FakeAnalyzer {
    drop_ts: f64,
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl VideoAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _video: &Path, _style: &MusicStyle) -> RunResult<VideoStructure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RunError::AnalysisUnavailable("model returned no sections".into()));
        }
        Ok(VideoStructure::new(
            128.0,
            vec![
                Section::new(SectionLabel::Build, 0.0, 10.0),
                Section::new(SectionLabel::Drop, 10.0, 30.0),
            ],
            self.drop_ts,
        )
        .unwrap())
    }
}

struct FakeComposer {
    calls: AtomicUsize,
    /// Flipped while composing to simulate a shutdown mid-run.
    cancel_tx: Option<watch::Sender<bool>>,
}

#[async_trait]
impl MusicComposer for FakeComposer {
    async fn compose(&self, request: &MusicRequest) -> RunResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.bpm, 128.0);
        if let Some(tx) = &self.cancel_tx {
            tx.send(true).unwrap();
        }
        Ok(TRACK.to_vec())
    }
}

struct FakeDetector {
    outcome: DropDetection,
    calls: AtomicUsize,
}

#[async_trait]
impl AudioDropDetector for FakeDetector {
    async fn detect(&self, audio: &Path) -> RunResult<DropDetection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(std::fs::read(audio).unwrap(), TRACK);
        Ok(self.outcome.clone())
    }
}

/// Media engine that writes marker files instead of invoking FFmpeg.
#[derive(Default)]
struct FakeMedia {
    durations: HashMap<String, f64>,
    /// Render blocks until the run is cancelled, like a long encode.
    stall_render: bool,
    plans: Mutex<Vec<AlignmentPlan>>,
    timelines: Mutex<Vec<RemixTimeline>>,
    muxed: Mutex<Vec<(Vec<u8>, f64, f64)>>,
}

impl FakeMedia {
    fn with_durations(durations: &[(&str, f64)]) -> Self {
        Self {
            durations: durations
                .iter()
                .map(|(name, d)| (name.to_string(), *d))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaEngine for FakeMedia {
    async fn probe_video(&self, path: &Path) -> RunResult<VideoInfo> {
        let name = path.file_stem().unwrap().to_string_lossy().to_string();
        Ok(VideoInfo {
            duration: self.durations.get(&name).copied().unwrap_or(30.0),
            width: 1080,
            height: 1920,
            fps: 30.0,
            codec: "h264".into(),
            has_audio: false,
        })
    }

    async fn render(
        &self,
        timeline: &RemixTimeline,
        settings: &RenderSettings,
        output: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> RunResult<RenderOutput> {
        assert_eq!((settings.width, settings.height), (1080, 1920));
        if self.stall_render {
            let mut cancel = cancel.clone();
            tokio::time::timeout(Duration::from_secs(5), cancel.wait_for(|c| *c))
                .await
                .expect("render never saw the cancel flag")
                .unwrap();
            return Err(MediaError::Cancelled.into());
        }
        tokio::fs::write(output, b"silent video").await?;
        self.timelines.lock().unwrap().push(timeline.clone());
        Ok(RenderOutput {
            path: output.to_path_buf(),
            duration: timeline.total_duration(),
            frames: timeline.total_frames(),
        })
    }

    async fn align(
        &self,
        input: &Path,
        output: &Path,
        plan: &AlignmentPlan,
        _cancel: &watch::Receiver<bool>,
    ) -> RunResult<AlignedTrack> {
        self.plans.lock().unwrap().push(*plan);
        let path = match plan {
            AlignmentPlan::Passthrough { .. } => {
                let target = output.with_extension(input.extension().unwrap());
                tokio::fs::copy(input, &target).await?;
                target
            }
            AlignmentPlan::Shift { .. } => {
                tokio::fs::write(output, b"RIFF shifted").await?;
                output.to_path_buf()
            }
        };
        Ok(AlignedTrack {
            path,
            status: plan.status(),
        })
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        duration: f64,
        options: &MuxOptions,
        _cancel: &watch::Receiver<bool>,
    ) -> RunResult<PathBuf> {
        let audio_bytes = tokio::fs::read(audio).await?;
        let mut out = tokio::fs::read(video).await?;
        out.extend_from_slice(&audio_bytes);
        tokio::fs::write(output, out).await?;
        self.muxed
            .lock()
            .unwrap()
            .push((audio_bytes, duration, options.fade_out));
        Ok(output.to_path_buf())
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, data: Vec<u8>, key: &str, _content_type: &str) -> RunResult<String> {
        let uri = format!("mem://remixes/{}", key);
        self.objects.lock().unwrap().insert(uri.clone(), data);
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> RunResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| RunError::Storage(StorageError::NotFound(uri.to_string())))
    }
}

#[derive(Default)]
struct MemoryRecords {
    records: Mutex<HashMap<String, RunRecord>>,
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn upsert(&self, run_id: &str, record: &RunRecord) -> RunResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(run_id.to_string(), record.clone());
        Ok(())
    }
}

struct Harness {
    analyzer: Arc<FakeAnalyzer>,
    composer: Arc<FakeComposer>,
    detector: Arc<FakeDetector>,
    media: Arc<FakeMedia>,
    store: Arc<MemoryStore>,
    records: Arc<MemoryRecords>,
    clips: TempDir,
    work: TempDir,
}

impl Harness {
    fn new(outcome: DropDetection) -> Self {
        Self {
            analyzer: Arc::new(FakeAnalyzer {
                drop_ts: 12.0,
                fail: false,
                calls: AtomicUsize::new(0),
            }),
            composer: Arc::new(FakeComposer {
                calls: AtomicUsize::new(0),
                cancel_tx: None,
            }),
            detector: Arc::new(FakeDetector {
                outcome,
                calls: AtomicUsize::new(0),
            }),
            media: Arc::new(FakeMedia::default()),
            store: Arc::new(MemoryStore::default()),
            records: Arc::new(MemoryRecords::default()),
            clips: tempfile::tempdir().unwrap(),
            work: tempfile::tempdir().unwrap(),
        }
    }

    fn pipeline(&self) -> RemixPipeline {
        let services = Services {
            analyzer: self.analyzer.clone(),
            composer: self.composer.clone(),
            detector: self.detector.clone(),
            media: self.media.clone(),
            store: self.store.clone(),
            records: self.records.clone(),
        };
        RemixPipeline::new(services, RunConfig::default().with_work_dir(self.work.path()))
    }

    fn clip(&self, name: &str) -> ClipInput {
        let path = self.clips.path().join(format!("{}.mp4", name));
        std::fs::write(&path, name.as_bytes()).unwrap();
        ClipInput {
            clip: ClipRef::new(name),
            source: ClipSource::Path(path),
        }
    }

    fn request(&self, run_id: &str) -> RunRequest {
        RunRequest {
            run_id: RunId::from_string(run_id),
            ..RunRequest::new(self.clip("original"))
                .with_variants(vec![self.clip("anime"), self.clip("clay"), self.clip("pixel")])
        }
    }
}

fn detected(drop_ts: f64, duration: f64) -> DropDetection {
    DropDetection::Detected(AudioStructure::new(drop_ts, duration).unwrap())
}

fn idle() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn test_synced_remix_end_to_end() {
    let harness = Harness::new(detected(10.5, 40.0));
    let report = harness
        .pipeline()
        .run(&harness.request("run-e2e"), idle())
        .await
        .unwrap();

    let offset = report.offset.unwrap();
    assert!((offset.delta - 1.5).abs() < 1e-9);
    assert_eq!(offset.direction, Direction::DelayAudio);
    assert_eq!(report.alignment_status, AlignmentStatus::Applied);
    assert_eq!(report.duration, 30.0);

    let plan = harness.media.plans.lock().unwrap()[0];
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
        other => panic!("expected a shift, got {:?}", other),
    }

    let timelines = harness.media.timelines.lock().unwrap();
    let ranges = timelines[0].ranges();
    let expected = [(0.0, 7.5), (7.5, 15.0), (15.0, 22.5), (22.5, 30.0)];
    assert_eq!(ranges.len(), expected.len());
    for (range, (start, end)) in ranges.iter().zip(expected) {
        assert!((range.start - start).abs() < 1e-9);
        assert!((range.end - end).abs() < 1e-9);
    }
    let sources: Vec<&str> = timelines[0]
        .segments()
        .iter()
        .map(|s| s.segment.source_clip.as_str())
        .collect();
    assert_eq!(sources, ["original", "anime", "clay", "pixel"]);

    let muxed = harness.media.muxed.lock().unwrap();
    assert_eq!(muxed[0].1, 30.0);
    assert_eq!(muxed[0].2, 1.0);

    assert_eq!(report.output_uri, "mem://remixes/remixes/run-e2e/remix.mp4");
    assert!(harness
        .store
        .objects
        .lock()
        .unwrap()
        .contains_key(&report.output_uri));

    let records = harness.records.records.lock().unwrap();
    let record = &records["run-e2e"];
    assert_eq!(record.offset, Some(offset));
    assert_eq!(record.alignment_status.record_value(), "applied");
    assert_eq!(record.output_uri, report.output_uri);

    assert!(!harness.work.path().join("run-e2e").exists());
}

#[tokio::test]
async fn test_no_detectable_drop_keeps_track_unmodified() {
    let harness = Harness::new(DropDetection::NoDetectableDrop);
    let report = harness
        .pipeline()
        .run(&harness.request("run-flat"), idle())
        .await
        .unwrap();

    assert_eq!(
        report.alignment_status,
        AlignmentStatus::Skipped {
            reason: SkipReason::NoDetectableDrop
        }
    );
    assert!(report.offset.is_none());
    assert_eq!(harness.media.muxed.lock().unwrap()[0].0, TRACK);

    let records = harness.records.records.lock().unwrap();
    let record = &records["run-flat"];
    assert_eq!(record.offset, None);
    assert_eq!(
        record.alignment_status.record_value(),
        "skipped:no_detectable_drop"
    );
}

#[tokio::test]
async fn test_offset_beyond_track_is_skipped() {
    // Video drop at 12s, track drop at 2s of a 5s track: a 10s shift.
    let harness = Harness::new(detected(2.0, 5.0));
    let report = harness
        .pipeline()
        .run(&harness.request("run-short"), idle())
        .await
        .unwrap();

    assert_eq!(
        report.alignment_status,
        AlignmentStatus::Skipped {
            reason: SkipReason::OffsetOutOfRange
        }
    );
    assert!((report.offset.unwrap().delta - 10.0).abs() < 1e-9);
    assert_eq!(harness.media.muxed.lock().unwrap()[0].0, TRACK);
    assert!(!harness.store.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_generation_publishes_nothing() {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut harness = Harness::new(detected(10.5, 40.0));
    harness.composer = Arc::new(FakeComposer {
        calls: AtomicUsize::new(0),
        cancel_tx: Some(cancel_tx),
    });

    let err = harness
        .pipeline()
        .run(&harness.request("run-cancel"), cancel_rx)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled));
    assert_eq!(harness.composer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 0);
    assert!(harness.store.objects.lock().unwrap().is_empty());
    assert!(harness.records.records.lock().unwrap().is_empty());
    assert!(!harness.work.path().join("run-cancel").exists());
}

#[tokio::test]
async fn test_cancel_reaches_a_running_render() {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut harness = Harness::new(detected(10.5, 40.0));
    harness.media = Arc::new(FakeMedia {
        stall_render: true,
        ..FakeMedia::default()
    });
    let pipeline = harness.pipeline();
    let request = harness.request("run-stalled");

    let run = pipeline.run(&request, cancel_rx);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(run, cancel);

    assert!(matches!(result, Err(RunError::Cancelled)));
    assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 1);
    assert!(harness.media.muxed.lock().unwrap().is_empty());
    assert!(harness.store.objects.lock().unwrap().is_empty());
    assert!(harness.records.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_fractions_reject_before_analysis() {
    let harness = Harness::new(detected(10.5, 40.0));
    let mut request = harness.request("run-bad-plan");
    request.plan = vec![PlanEntry::new("anime", 0.5), PlanEntry::new("clay", 0.49)];

    let err = harness.pipeline().run(&request, idle()).await.unwrap_err();

    assert!(matches!(err, RunError::TimelineRejected(_)));
    assert!(!err.is_retryable());
    assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 0);
    assert!(harness.store.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_analysis_failure_is_retryable_and_unpublished() {
    let mut harness = Harness::new(detected(10.5, 40.0));
    harness.analyzer = Arc::new(FakeAnalyzer {
        drop_ts: 12.0,
        fail: true,
        calls: AtomicUsize::new(0),
    });

    let err = harness
        .pipeline()
        .run(&harness.request("run-blind"), idle())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::AnalysisUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.composer.calls.load(Ordering::SeqCst), 0);
    assert!(harness.records.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_output_is_capped_to_shortest_clip() {
    let mut harness = Harness::new(detected(10.5, 40.0));
    harness.media = Arc::new(FakeMedia::with_durations(&[("clay", 15.0)]));

    let report = harness
        .pipeline()
        .run(&harness.request("run-capped"), idle())
        .await
        .unwrap();

    assert_eq!(report.duration, 15.0);
    assert_eq!(harness.media.muxed.lock().unwrap()[0].1, 15.0);
    let plan = harness.media.plans.lock().unwrap()[0];
    match plan {
        AlignmentPlan::Shift { output_duration, .. } => assert_eq!(output_duration, 15.0),
        other => panic!("expected a shift, got {:?}", other),
    }
}

#[tokio::test]
async fn test_object_sources_are_fetched() {
    let harness = Harness::new(detected(10.5, 40.0));
    harness
        .store
        .objects
        .lock()
        .unwrap()
        .insert("mem://clips/anime.mp4".into(), b"anime".to_vec());

    let mut request = harness.request("run-remote");
    request.variants = vec![ClipInput {
        clip: ClipRef::new("anime"),
        source: ClipSource::Object("mem://clips/anime.mp4".into()),
    }];

    let report = harness.pipeline().run(&request, idle()).await.unwrap();
    assert_eq!(report.alignment_status, AlignmentStatus::Applied);

    let mut missing = harness.request("run-missing");
    missing.variants = vec![ClipInput {
        clip: ClipRef::new("ghost"),
        source: ClipSource::Object("mem://clips/ghost.mp4".into()),
    }];
    let err = harness.pipeline().run(&missing, idle()).await.unwrap_err();
    assert!(matches!(err, RunError::Storage(StorageError::NotFound(_))));
}

#[tokio::test]
async fn test_batch_returns_one_result_per_run() {
    let harness = Harness::new(detected(10.5, 40.0));
    let good = harness.request("run-a");
    let mut broken = harness.request("run-b");
    broken.variants.push(ClipInput {
        clip: ClipRef::new("missing"),
        source: ClipSource::Path(harness.clips.path().join("nope.mp4")),
    });
    let also_good = harness.request("run-c");

    let executor = BatchExecutor::new(harness.pipeline(), 2, idle());
    let results = executor.run_all(vec![good, broken, also_good]).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(RunError::InvalidRequest(_))));
    assert!(results[2].is_ok());
    assert_eq!(harness.composer.calls.load(Ordering::SeqCst), 2);

    let records = harness.records.records.lock().unwrap();
    assert!(records.contains_key("run-a"));
    assert!(records.contains_key("run-c"));
    assert!(!records.contains_key("run-b"));
}

#[tokio::test]
async fn test_batch_cancelled_before_start() {
    let harness = Harness::new(detected(10.5, 40.0));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let executor = BatchExecutor::new(harness.pipeline(), 1, cancel_rx);
    let results = executor
        .run_all(vec![harness.request("run-x"), harness.request("run-y")])
        .await;

    assert!(results.iter().all(|r| matches!(r, Err(RunError::Cancelled))));
    assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 0);
}
