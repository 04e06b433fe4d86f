use capture::{FrameBuffer, ReaderStats, ReaderStatus, redact};
use chrono::{DateTime, Utc};
use common::Shutdown;
use detection::DetectionState;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One accepted stream as seen by the HTTP layer.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub name: String,
    /// Credential-free form of the source URL.
    pub url: String,
    pub buffer: Arc<FrameBuffer>,
    pub status: Arc<ReaderStatus>,
}

impl StreamHandle {
    pub fn new(
        name: impl Into<String>,
        url: &str,
        buffer: Arc<FrameBuffer>,
        status: Arc<ReaderStatus>,
    ) -> Self {
        Self {
            name: name.into(),
            url: redact(url),
            buffer,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub fps: f64,
    pub jpeg_quality: u8,
}

impl FeedSettings {
    pub fn interval(&self) -> Duration {
        if self.fps.is_finite() && self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::from_millis(50)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub camera_id: String,
    /// Redacted description of where frames come from.
    pub source: String,
    pub streams: Arc<Vec<StreamHandle>>,
    pub detection: Arc<DetectionState>,
    pub detection_enabled: bool,
    pub feed: FeedSettings,
    /// Ends open MJPEG feeds so graceful shutdown can complete.
    pub shutdown: Shutdown,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl AppState {
    pub fn new(
        camera_id: impl Into<String>,
        source: &str,
        streams: Vec<StreamHandle>,
        detection: Arc<DetectionState>,
        detection_enabled: bool,
        feed: FeedSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            source: redact(source),
            streams: Arc::new(streams),
            detection,
            detection_enabled,
            feed,
            shutdown,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn stream(&self, name: &str) -> Option<&StreamHandle> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn status(&self) -> StatusReport {
        let streams: Vec<StreamReport> = self
            .streams
            .iter()
            .map(|s| StreamReport {
                name: s.name.clone(),
                url: s.url.clone(),
                has_frame: !s.buffer.is_empty(),
                stats: s.status.snapshot(),
            })
            .collect();
        let active_streams = streams
            .iter()
            .filter(|s| s.has_frame)
            .map(|s| s.name.clone())
            .collect();
        let uptime = self.uptime();

        StatusReport {
            camera_id: self.camera_id.clone(),
            source: self.source.clone(),
            streams,
            active_streams,
            started_at: self.started_at,
            uptime_secs: uptime.as_secs(),
            uptime: format_uptime(uptime),
            fire_detection_enabled: self.detection_enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub name: String,
    pub url: String,
    pub has_frame: bool,
    #[serde(flatten)]
    pub stats: ReaderStats,
}

/// Body of `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub camera_id: String,
    pub source: String,
    pub streams: Vec<StreamReport>,
    /// Streams that currently hold a frame.
    pub active_streams: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub uptime: String,
    pub fire_detection_enabled: bool,
}

/// `H:MM:SS`, hours unbounded.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
