//! FFmpeg CLI wrapper for remix assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts via tokio
//! - Timeline construction with zoom-slam transitions
//! - Segment rendering, audio alignment and muxing

pub mod align;
pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod mux;
pub mod probe;
pub mod progress;
pub mod render;
pub mod timeline;

pub use align::{align_audio, AlignedTrack};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult, TimelineRejection};
pub use mux::{mux_audio, MuxOptions};
pub use probe::{probe_audio, probe_video, AudioInfo, VideoInfo};
pub use progress::FfmpegProgress;
pub use render::{render_timeline, RenderOutput, RenderSettings};
pub use timeline::{ClipCatalog, RemixTimeline, ResolvedClip, TimelineSegment};
