//! Put the synced track onto the assembled video.

use std::path::Path;

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::{discard, move_file, partial_path};

/// Mux settings.
#[derive(Debug, Clone)]
pub struct MuxOptions {
    /// Fade-out length at the end of the video, in seconds
    pub fade_out: f64,
    pub audio_bitrate: String,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            fade_out: 1.0,
            audio_bitrate: "192k".to_string(),
        }
    }
}

/// Audio filter fitting the track to `video_duration`.
///
/// Short tracks are padded with silence; long ones are cut. The fade is
/// dropped when the video is not longer than it.
pub fn mux_audio_filter(video_duration: f64, fade_out: f64) -> String {
    let mut filter = format!("apad,atrim=end={:.3}", video_duration);
    if fade_out > 0.0 && video_duration > fade_out {
        filter.push_str(&format!(
            ",afade=t=out:st={:.3}:d={:.3}",
            video_duration - fade_out,
            fade_out
        ));
    }
    filter
}

/// Write `video` with `audio` as its soundtrack to `output`.
///
/// The file appears at `output` only after FFmpeg has finished.
pub async fn mux_audio(
    video: &Path,
    audio: &Path,
    output: &Path,
    video_duration: f64,
    options: &MuxOptions,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let partial = partial_path(output);

    let cmd = FfmpegCommand::without_inputs(&partial)
        .input(video)
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .audio_filter(mux_audio_filter(video_duration, options.fade_out))
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate(options.audio_bitrate.clone())
        .duration(video_duration)
        .faststart();

    if let Err(e) = runner.run(&cmd).await {
        discard(&partial).await;
        return Err(e);
    }
    move_file(&partial, output).await?;

    info!(output = %output.display(), video_duration, "Audio muxed");
    Ok(())
}
