use serde::Deserialize;
use std::time::Duration;

/// Tuning for one [`StreamReader`](crate::reader::StreamReader).
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub open_timeout: Duration,
    pub reconnect_backoff: Duration,
    /// No frame for this long while streaming counts as a dead stream.
    pub stall_timeout: Duration,
    /// Upper bound on a single wait for the next frame; bounds shutdown latency.
    pub poll_interval: Duration,
    pub max_width: u32,
    pub max_fps: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            reconnect_backoff: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            max_width: 1920,
            max_fps: 20.0,
        }
    }
}

/// `[capture]` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub max_width: u32,
    pub max_fps: f64,
    pub open_timeout_secs: f64,
    pub probe_timeout_secs: f64,
    pub io_timeout_secs: f64,
    pub reconnect_backoff_secs: f64,
    pub stall_timeout_secs: f64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_fps: 20.0,
            open_timeout_secs: 10.0,
            probe_timeout_secs: 5.0,
            io_timeout_secs: 10.0,
            reconnect_backoff_secs: 10.0,
            stall_timeout_secs: 15.0,
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
        }
    }
}

fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

impl CaptureSettings {
    pub fn reader_config(&self) -> ReaderConfig {
        let defaults = ReaderConfig::default();
        ReaderConfig {
            open_timeout: secs(self.open_timeout_secs, defaults.open_timeout),
            reconnect_backoff: secs(self.reconnect_backoff_secs, defaults.reconnect_backoff),
            stall_timeout: secs(self.stall_timeout_secs, defaults.stall_timeout),
            poll_interval: defaults.poll_interval,
            max_width: self.max_width,
            max_fps: self.max_fps,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        secs(self.probe_timeout_secs, Duration::from_secs(5))
    }

    pub fn io_timeout(&self) -> Duration {
        secs(self.io_timeout_secs, Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_match_reader_defaults() {
        assert_eq!(CaptureSettings::default().reader_config(), ReaderConfig::default());
    }

    #[test]
    fn invalid_durations_fall_back() {
        let settings = CaptureSettings {
            reconnect_backoff_secs: -1.0,
            stall_timeout_secs: 0.0,
            probe_timeout_secs: f64::NAN,
            ..Default::default()
        };
        let config = settings.reader_config();
        assert_eq!(config.reconnect_backoff, Duration::from_secs(10));
        assert_eq!(config.stall_timeout, Duration::from_secs(15));
        assert_eq!(settings.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let settings = CaptureSettings {
            reconnect_backoff_secs: 0.25,
            ..Default::default()
        };
        assert_eq!(
            settings.reader_config().reconnect_backoff,
            Duration::from_millis(250)
        );
    }
}
