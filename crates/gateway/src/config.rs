use capture::{CameraEndpoint, CaptureSettings};
use common::Environment;
use detection::DetectionSettings;
use serde::Deserialize;

const ENV_PREFIX: &str = "FIREWATCH";
const SETTINGS_FILE: &str = "firewatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// IP camera; the stream paths are probed at startup.
    Rtsp,
    /// Drone relay publishing an HLS playlist.
    Hls,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub hls_url: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Rtsp,
            host: "192.168.1.201".into(),
            port: 554,
            username: "admin".into(),
            password: String::new(),
            hls_url: "http://localhost:8082/hls/stream.m3u8".into(),
        }
    }
}

impl SourceSettings {
    pub fn camera(&self) -> CameraEndpoint {
        CameraEndpoint {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Frame rate of the MJPEG viewer feed.
    pub stream_fps: f64,
    pub jpeg_quality: u8,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            stream_fps: 20.0,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Load settings from defaults, an optional `firewatch.toml` in the working
/// directory and `FIREWATCH_*` environment variables, in increasing priority.
///
/// Nested keys use `__`, e.g. `FIREWATCH_DETECTION__INTERVAL_SECS=5`. The
/// sampling preference is a comma separated list.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .add_source(config::File::with_name(SETTINGS_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("detection.sampling_preference")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<Settings>()
}
