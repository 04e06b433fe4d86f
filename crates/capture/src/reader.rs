use crate::buffer::FrameBuffer;
use crate::candidates::redact;
use crate::config::ReaderConfig;
use crate::errors::CaptureError;
use crate::frame::Frame;
use crate::pacing::FramePacer;
use crate::source::{FrameStream, VideoSource};
use common::Shutdown;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ReaderState {
    Disconnected = 0,
    Connecting = 1,
    Streaming = 2,
    Reconnecting = 3,
    Stopped = 4,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReaderState::Connecting,
            2 => ReaderState::Streaming,
            3 => ReaderState::Reconnecting,
            4 => ReaderState::Stopped,
            _ => ReaderState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderState::Disconnected => "disconnected",
            ReaderState::Connecting => "connecting",
            ReaderState::Streaming => "streaming",
            ReaderState::Reconnecting => "reconnecting",
            ReaderState::Stopped => "stopped",
        }
    }
}

/// Live state and counters of one reader, shared with the status API.
#[derive(Debug, Default)]
pub struct ReaderStatus {
    state: AtomicU8,
    connect_attempts: AtomicU64,
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,
    decode_errors: AtomicU64,
    disconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub state: ReaderState,
    pub connect_attempts: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub decode_errors: u64,
    pub disconnects: u64,
}

impl ReaderStatus {
    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            state: self.state(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

enum StreamEnd {
    Shutdown,
    Failed(CaptureError),
}

/// Keeps one stream's [`FrameBuffer`] filled, reconnecting forever until
/// shutdown.
pub struct StreamReader {
    name: String,
    url: String,
    source: Arc<dyn VideoSource>,
    buffer: Arc<FrameBuffer>,
    config: ReaderConfig,
    status: Arc<ReaderStatus>,
}

impl StreamReader {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        source: Arc<dyn VideoSource>,
        buffer: Arc<FrameBuffer>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            source,
            buffer,
            config,
            status: Arc::new(ReaderStatus::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Arc<ReaderStatus> {
        Arc::clone(&self.status)
    }

    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("reader-{}", self.name))
            .spawn(move || self.run(&shutdown))
    }

    pub fn run(&self, shutdown: &Shutdown) {
        let url = redact(&self.url);
        let mut pacer = FramePacer::new(self.config.max_fps);
        tracing::info!(stream = %self.name, url = %url, "Stream reader started");

        while !shutdown.is_triggered() {
            self.status.set_state(ReaderState::Connecting);
            ReaderStatus::bump(&self.status.connect_attempts);

            match self.source.open(&self.url, self.config.open_timeout) {
                Ok(mut stream) => {
                    self.status.set_state(ReaderState::Streaming);
                    tracing::info!(stream = %self.name, "Connected");
                    pacer.reset();

                    let end = self.stream_frames(stream.as_mut(), &mut pacer, shutdown);
                    // Release the connection before backing off.
                    drop(stream);

                    match end {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Failed(e) => {
                            ReaderStatus::bump(&self.status.disconnects);
                            tracing::warn!(stream = %self.name, error = %e, "Stream lost");
                        }
                    }
                }
                Err(CaptureError::Cancelled { .. }) => break,
                Err(e) => {
                    tracing::warn!(stream = %self.name, error = %e, "Failed to connect");
                }
            }

            self.status.set_state(ReaderState::Reconnecting);
            tracing::info!(
                stream = %self.name,
                backoff = ?self.config.reconnect_backoff,
                "Reconnecting after backoff"
            );
            if !shutdown.sleep(self.config.reconnect_backoff) {
                break;
            }
        }

        self.status.set_state(ReaderState::Stopped);
        let stats = self.status.snapshot();
        tracing::info!(
            stream = %self.name,
            published = stats.frames_published,
            dropped = stats.frames_dropped,
            "Stream reader stopped"
        );
    }

    fn stream_frames(
        &self,
        stream: &mut dyn FrameStream,
        pacer: &mut FramePacer,
        shutdown: &Shutdown,
    ) -> StreamEnd {
        let mut last_frame = Instant::now();

        while !shutdown.is_triggered() {
            match stream.next_frame(self.config.poll_interval) {
                Ok(Some(frame)) => {
                    last_frame = Instant::now();
                    self.handle_frame(frame, pacer, last_frame);
                }
                Ok(None) => {
                    let silent = last_frame.elapsed();
                    if silent >= self.config.stall_timeout {
                        return StreamEnd::Failed(CaptureError::Stalled(silent));
                    }
                }
                Err(e) if e.is_transient() => {
                    ReaderStatus::bump(&self.status.decode_errors);
                    tracing::debug!(stream = %self.name, error = %e, "Skipping corrupt frame");
                }
                Err(e) => return StreamEnd::Failed(e),
            }
        }
        StreamEnd::Shutdown
    }

    fn handle_frame(&self, frame: Frame, pacer: &mut FramePacer, now: Instant) {
        if !pacer.admit(now) {
            ReaderStatus::bump(&self.status.frames_dropped);
            return;
        }

        let frame = match frame.downscaled(self.config.max_width) {
            Ok(Some(smaller)) => smaller,
            Ok(None) => frame,
            Err(e) => {
                ReaderStatus::bump(&self.status.decode_errors);
                tracing::warn!(stream = %self.name, error = %e, "Failed to downscale frame");
                return;
            }
        };

        let sequence = self.buffer.publish(frame);
        ReaderStatus::bump(&self.status.frames_published);
        if sequence == 1 || sequence.is_multiple_of(300) {
            tracing::debug!(stream = %self.name, sequence, "Frames published");
        }
    }
}
