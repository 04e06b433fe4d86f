use crate::scene::SceneGateConfig;
use crate::stats::DEFAULT_HISTORY_CAPACITY;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// `[detection]` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub camera_id: String,
    pub interval_secs: f64,
    pub request_timeout_secs: f64,
    pub jpeg_quality: u8,
    pub history_capacity: usize,
    /// Streams tried first when sampling; the rest follow in probe order.
    pub sampling_preference: Vec<String>,
    pub alert_log: Option<PathBuf>,
    pub scene: SceneGateConfig,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            camera_id: "rtsp_camera_1".into(),
            interval_secs: 3.0,
            request_timeout_secs: 10.0,
            jpeg_quality: 85,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sampling_preference: vec!["sub".into(), "main".into()],
            alert_log: None,
            scene: SceneGateConfig::default(),
        }
    }
}

impl DetectionSettings {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let defaults = DispatcherConfig::default();
        DispatcherConfig {
            interval: Duration::try_from_secs_f64(self.interval_secs)
                .ok()
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.interval),
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(10))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            jpeg_quality: 85,
        }
    }
}
