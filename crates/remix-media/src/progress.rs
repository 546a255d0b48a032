//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one `key=value` line into the current state.
    ///
    /// Returns true when the line closes a progress block.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };

        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return true;
            }
            _ => {}
        }
        false
    }

    /// Whether a stderr line belongs to the progress stream.
    pub fn is_progress_line(line: &str) -> bool {
        const KEYS: &[&str] = &[
            "frame", "fps", "stream_", "bitrate", "total_size", "out_time", "dup_frames",
            "drop_frames", "speed", "progress",
        ];
        match line.trim().split_once('=') {
            Some((key, _)) => KEYS.iter().any(|k| key.starts_with(k)),
            None => false,
        }
    }

    /// Percentage of `total_ms` encoded so far.
    pub fn percentage(&self, total_ms: i64) -> f64 {
        if total_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_ms as f64) * 100.0).min(100.0)
    }
}
