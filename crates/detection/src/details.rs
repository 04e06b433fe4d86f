use capture::Frame;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Summary of one sampled frame, logged every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDetails {
    pub frame_number: u64,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    /// BT.601 luma mean, 0-255.
    pub brightness: f64,
    pub mean_red: f64,
    pub mean_green: f64,
    pub mean_blue: f64,
    pub captured_at: DateTime<Utc>,
}

impl FrameDetails {
    pub fn of(frame: &Frame, frame_number: u64) -> Self {
        let rgb = frame.rgb_bytes();
        let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
        for px in rgb.chunks_exact(3) {
            r += px[0] as u64;
            g += px[1] as u64;
            b += px[2] as u64;
        }
        let pixels = (rgb.len() / 3).max(1) as f64;
        let (mean_red, mean_green, mean_blue) = (r as f64 / pixels, g as f64 / pixels, b as f64 / pixels);

        Self {
            frame_number,
            sequence: frame.sequence(),
            width: frame.width(),
            height: frame.height(),
            channels: frame.channels(),
            brightness: 0.299 * mean_red + 0.587 * mean_green + 0.114 * mean_blue,
            mean_red,
            mean_green,
            mean_blue,
            captured_at: frame.captured_at(),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            frame_number = self.frame_number,
            width = self.width,
            height = self.height,
            brightness = self.brightness,
            r = self.mean_red,
            g = self.mean_green,
            b = self.mean_blue,
            "Frame details"
        );
    }
}
