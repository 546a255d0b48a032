//! FFmpeg video filter definitions.

use remix_models::TransitionSpec;

/// Normalise a clip to the output geometry and frame rate.
///
/// Timestamps are reset so per-segment expressions see `t = 0` at the
/// segment's first frame.
pub fn conform_filter(width: u32, height: u32, fps: f64) -> String {
    format!(
        "setpts=PTS-STARTPTS,scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
        w = width,
        h = height,
        fps = format_rate(fps)
    )
}

/// Part of a zoom slam that falls inside one segment, in segment-local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomWindow {
    pub start: f64,
    pub end: f64,
    /// Local time of the cut this window belongs to
    pub cut_at: f64,
}

impl ZoomWindow {
    /// Window on the head of the incoming segment (cut at `t = 0`).
    pub fn head(spec: &TransitionSpec) -> Self {
        Self {
            start: 0.0,
            end: spec.half(),
            cut_at: 0.0,
        }
    }

    /// Window on the tail of an outgoing segment of `segment_len` seconds.
    pub fn tail(spec: &TransitionSpec, segment_len: f64) -> Self {
        Self {
            start: (segment_len - spec.half()).max(0.0),
            end: segment_len,
            cut_at: segment_len,
        }
    }

    /// Zoom factor at local time `t`.
    pub fn scale_at(&self, spec: &TransitionSpec, t: f64) -> f64 {
        if t < self.start || t > self.end {
            return 1.0;
        }
        spec.scale_at(t - self.cut_at)
    }
}

/// Per-frame zoom expression over `windows`, in terms of the input time `it`.
///
/// Commas are escaped for use inside a filtergraph.
pub fn zoom_expr(spec: &TransitionSpec, windows: &[ZoomWindow]) -> String {
    let mut expr = "1".to_string();
    for w in windows.iter().rev() {
        // s0 + (s1 - s0) * (t - cut + d/2) / d
        let ramp = format!(
            "{s0:.6}+({delta:.6})*(it-{cut:.6}+{half:.6})/{d:.6}",
            s0 = spec.scale_start,
            delta = spec.scale_end - spec.scale_start,
            cut = w.cut_at,
            half = spec.half(),
            d = spec.duration,
        );
        expr = format!(
            "if(between(it\\,{start:.6}\\,{end:.6})\\,{ramp}\\,{rest})",
            start = w.start,
            end = w.end,
            ramp = ramp,
            rest = expr
        );
    }
    expr
}

/// Centre-anchored zoom over `windows`, one output frame per input frame.
pub fn zoom_slam_filter(
    spec: &TransitionSpec,
    windows: &[ZoomWindow],
    width: u32,
    height: u32,
    fps: f64,
) -> Option<String> {
    if windows.is_empty() {
        return None;
    }
    Some(format!(
        "zoompan=z={z}:d=1:x=iw/2-(iw/zoom/2):y=ih/2-(ih/zoom/2):s={w}x{h}:fps={fps}",
        z = zoom_expr(spec, windows),
        w = width,
        h = height,
        fps = format_rate(fps)
    ))
}

/// Frame rate as FFmpeg expects it; NTSC rates become fractions.
pub fn format_rate(fps: f64) -> String {
    for base in [24.0_f64, 30.0, 60.0] {
        let ntsc = base * 1000.0 / 1001.0;
        if (fps - ntsc).abs() < 0.005 {
            return format!("{}/1001", (base * 1000.0) as u64);
        }
    }
    let rounded = (fps * 1000.0).round() / 1000.0;
    format!("{}", rounded)
}
