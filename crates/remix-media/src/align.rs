//! Apply an [`AlignmentPlan`] to a generated track.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use remix_models::{AlignmentPlan, AlignmentStatus};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::{copy_file, move_file, partial_path};

/// Result of the alignment step.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTrack {
    pub path: PathBuf,
    pub status: AlignmentStatus,
}

/// Audio filter for a head shift: trim, then delay, then pad forever.
/// The caller bounds the output with `-t`.
pub fn shift_filter(lead_silence: f64, trim_head: f64) -> String {
    let mut parts = Vec::new();
    if trim_head > 0.0 {
        parts.push(format!("atrim=start={:.3}", trim_head));
        parts.push("asetpts=PTS-STARTPTS".to_string());
    }
    if lead_silence > 0.0 {
        let ms = (lead_silence * 1000.0).round() as u64;
        parts.push(format!("adelay=delays={}:all=1", ms));
    }
    parts.push("apad".to_string());
    parts.join(",")
}

/// Align `input` according to `plan`, writing next to `output`.
///
/// A shift is rendered to `output` as PCM WAV of exactly the planned length.
/// A passthrough copies the original bytes unchanged, keeping the input's
/// extension.
pub async fn align_audio(
    input: &Path,
    output: &Path,
    plan: &AlignmentPlan,
    runner: &FfmpegRunner,
) -> MediaResult<AlignedTrack> {
    match *plan {
        AlignmentPlan::Passthrough { reason } => {
            let target = match input.extension() {
                Some(ext) => output.with_extension(ext),
                None => output.to_path_buf(),
            };
            let bytes = copy_file(input, &target).await?;
            info!(
                reason = reason.as_str(),
                bytes,
                "Alignment skipped, track kept unmodified"
            );
            Ok(AlignedTrack {
                path: target,
                status: plan.status(),
            })
        }
        AlignmentPlan::Shift {
            lead_silence,
            trim_head,
            output_duration,
        } => {
            let target = output.with_extension("wav");
            let partial = partial_path(&target);
            let filter = shift_filter(lead_silence, trim_head);
            debug!(filter = %filter, output_duration, "Shifting track");

            let cmd = FfmpegCommand::new(input, &partial)
                .audio_filter(filter)
                .duration(output_duration)
                .output_args(["-vn", "-c:a", "pcm_s16le"]);
            runner.run(&cmd).await?;
            move_file(&partial, &target).await?;

            info!(
                lead_silence,
                trim_head,
                output_duration,
                "Track aligned to video drop"
            );
            Ok(AlignedTrack {
                path: target,
                status: plan.status(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remix_models::{AudioStructure, Offset, SkipReason};

    #[test]
    fn test_delay_filter() {
        assert_eq!(shift_filter(1.5, 0.0), "adelay=delays=1500:all=1,apad");
    }

    #[test]
    fn test_trim_filter() {
        assert_eq!(
            shift_filter(0.0, 2.25),
            "atrim=start=2.250,asetpts=PTS-STARTPTS,apad"
        );
    }

    #[test]
    fn test_zero_shift_only_pads() {
        assert_eq!(shift_filter(0.0, 0.0), "apad");
    }

    #[tokio::test]
    async fn test_passthrough_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("generated.mp3");
        let bytes: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        tokio::fs::write(&input, &bytes).await.unwrap();

        let audio = AudioStructure::new(0.5, 2.0).unwrap();
        let offset = Offset::between(12.0, audio.drop_ts());
        let plan = AlignmentPlan::for_offset(&offset, &audio, 30.0);

        let aligned = align_audio(&input, &dir.path().join("aligned"), &plan, &FfmpegRunner::new())
            .await
            .unwrap();

        assert_eq!(
            aligned.status,
            AlignmentStatus::Skipped {
                reason: SkipReason::OffsetOutOfRange
            }
        );
        assert_eq!(aligned.path.extension().unwrap(), "mp3");
        assert_eq!(tokio::fs::read(&aligned.path).await.unwrap(), bytes);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_delay_prepends_silence() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        let runner = FfmpegRunner::new();
        let cmd = FfmpegCommand::without_inputs(&input)
            .input_with_args(["-f", "lavfi"], "sine=frequency=440:duration=40");
        runner.run(&cmd).await.unwrap();

        let audio = AudioStructure::new(10.5, 40.0).unwrap();
        let offset = Offset::between(12.0, audio.drop_ts());
        let plan = AlignmentPlan::for_offset(&offset, &audio, 30.0);
        let aligned = align_audio(&input, &dir.path().join("aligned"), &plan, &runner)
            .await
            .unwrap();

        let info = crate::probe::probe_audio(&aligned.path).await.unwrap();
        assert!((info.duration - 30.0).abs() < 0.01);
    }
}
