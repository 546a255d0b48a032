//! Timeline rendering.
//!
//! # Strategy
//!
//! Every segment is encoded on its own with identical geometry, frame rate
//! and codec settings, then the pieces are joined with the concat demuxer
//! using stream copy:
//! 1. Extract each segment with an exact `-frames:v` count. Counts come from
//!    boundaries quantised to the frame grid, so they add up to the output.
//! 2. Apply the zoom-slam halves on the segment's head and tail.
//! 3. Pad the final segment by cloning its last frame, covering a source
//!    that ends up to one frame early.
//! 4. Concatenate and check the result against the requested duration.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{conform_filter, zoom_slam_filter, ZoomWindow};
use crate::fs_utils::{move_file, partial_path};
use crate::probe::{probe_video, VideoInfo};
use crate::timeline::{RemixTimeline, TimelineSegment};

/// Encoding parameters shared by every segment.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub crf: u8,
    pub preset: String,
}

impl RenderSettings {
    /// Output geometry of `reference`, optionally at another frame rate.
    pub fn from_video(reference: &VideoInfo, fps_override: Option<f64>) -> Self {
        // libx264 needs even dimensions.
        let even = |v: u32| (v.max(2) / 2) * 2;
        Self {
            width: even(reference.width),
            height: even(reference.height),
            fps: fps_override.unwrap_or(reference.fps),
            crf: 18,
            preset: "veryfast".to_string(),
        }
    }
}

/// A rendered silent remix.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub path: PathBuf,
    /// Measured duration in seconds
    pub duration: f64,
    pub frames: u64,
}

/// Filter chain for one segment.
pub fn segment_filter(
    segment: &TimelineSegment,
    frames: u64,
    settings: &RenderSettings,
    is_last: bool,
) -> String {
    let local_len = frames as f64 / settings.fps;
    let mut filter = conform_filter(settings.width, settings.height, settings.fps);

    let mut windows = Vec::new();
    let mut spec = None;
    if let Some(t) = &segment.transition_at_start {
        windows.push(ZoomWindow::head(t));
        spec = Some(*t);
    }
    if let Some(t) = &segment.segment.transition_at_end {
        windows.push(ZoomWindow::tail(t, local_len));
        spec = Some(*t);
    }
    if let Some(spec) = spec {
        if let Some(zoom) =
            zoom_slam_filter(&spec, &windows, settings.width, settings.height, settings.fps)
        {
            filter.push(',');
            filter.push_str(&zoom);
        }
    }

    if is_last {
        filter.push_str(&format!(
            ",tpad=stop_mode=clone:stop_duration={:.6}",
            2.0 / settings.fps
        ));
    }
    filter
}

/// Concat demuxer list for `paths`.
pub fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Render `timeline` into a silent video at `output`.
pub async fn render_timeline(
    timeline: &RemixTimeline,
    settings: &RenderSettings,
    output: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<RenderOutput> {
    let work_parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(work_parent).await?;
    let temp_dir = tempfile::Builder::new()
        .prefix("segments-")
        .tempdir_in(work_parent)?;

    let counts = timeline.frame_counts();
    let last = timeline.segments().len().saturating_sub(1);
    let mut pieces = Vec::with_capacity(counts.len());

    info!(
        segments = counts.len(),
        total_frames = timeline.total_frames(),
        fps = settings.fps,
        "Rendering remix timeline"
    );

    for (index, (segment, &frames)) in timeline.segments().iter().zip(&counts).enumerate() {
        if frames == 0 {
            warn!(segment = index, "Segment rounds to zero frames, skipping");
            continue;
        }

        let piece = temp_dir.path().join(format!("seg_{:04}.mp4", index));
        let filter = segment_filter(segment, frames, settings, index == last);

        debug!(
            segment = index,
            clip = %segment.segment.source_clip,
            range = %segment.range(),
            frames,
            "Extracting segment"
        );

        let cmd = FfmpegCommand::without_inputs(&piece)
            .input_with_args(
                ["-ss".to_string(), format!("{:.6}", segment.range().start)],
                &segment.source.path,
            )
            .video_filter(filter)
            .frames(frames)
            .no_audio()
            .video_codec("libx264")
            .preset(settings.preset.clone())
            .crf(settings.crf)
            .output_args(["-pix_fmt", "yuv420p"]);
        runner.run(&cmd).await?;

        pieces.push(piece);
    }

    if pieces.is_empty() {
        return Err(MediaError::invalid_video("Timeline rendered no frames"));
    }

    let list_path = temp_dir.path().join("concat.txt");
    tokio::fs::write(&list_path, concat_list(&pieces)).await?;

    let partial = partial_path(output);
    let cmd = FfmpegCommand::without_inputs(&partial)
        .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
        .output_args(["-c", "copy"])
        .faststart();
    runner.run(&cmd).await?;

    let measured = probe_video(&partial).await?.duration;
    let expected = timeline.total_duration();
    if (measured - expected).abs() > timeline.frame_interval() + 1e-3 {
        crate::fs_utils::discard(&partial).await;
        return Err(MediaError::DurationMismatch {
            expected,
            actual: measured,
        });
    }

    move_file(&partial, output).await?;
    info!(
        output = %output.display(),
        duration = measured,
        "Remix timeline rendered"
    );

    Ok(RenderOutput {
        path: output.to_path_buf(),
        duration: measured,
        frames: counts.iter().sum(),
    })
}
