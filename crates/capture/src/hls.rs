use crate::errors::CaptureError;
use crate::ffmpeg::FfmpegSource;
use crate::source::{FrameStream, VideoSource};
use reqwest::blocking::Client;
use std::time::{Duration, Instant};

const PLAYLIST_RETRY: Duration = Duration::from_secs(3);
const PLAYLIST_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HLS relay input. Opening waits until the relay publishes a playlist with
/// segments, then hands the URL that answered to ffmpeg.
pub struct HlsSource {
    inner: FfmpegSource,
    client: Client,
    retry: Duration,
}

impl HlsSource {
    pub fn new(inner: FfmpegSource) -> Result<Self, CaptureError> {
        let client = Client::builder()
            .timeout(PLAYLIST_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CaptureError::Open {
                url: "hls".into(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            inner,
            client,
            retry: PLAYLIST_RETRY,
        })
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    fn fetch_ready(&self, url: &str) -> bool {
        match self.client.get(url).send() {
            Ok(resp) if resp.status().is_success() => {
                resp.text().map(|body| playlist_ready(&body)).unwrap_or(false)
            }
            Ok(resp) => {
                tracing::debug!(url, status = %resp.status(), "Playlist not available");
                false
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Playlist request failed");
                false
            }
        }
    }

    /// Poll the playlist and its nested variant until one carries segments.
    /// Gives up early when the inner source's shutdown is raised.
    pub fn wait_for_playlist(&self, url: &str, timeout: Duration) -> Result<String, CaptureError> {
        let shutdown = self.inner.shutdown();
        let mut urls = vec![url.to_string()];
        if let Some(nested) = nested_variant(url) {
            urls.push(nested);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if shutdown.is_triggered() {
                return Err(CaptureError::Cancelled { url: url.into() });
            }
            if let Some(ready) = urls.iter().find(|u| self.fetch_ready(u)) {
                tracing::info!(url = %ready, "HLS playlist ready");
                return Ok(ready.clone());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CaptureError::PlaylistUnavailable { url: url.into() });
            }
            tracing::info!(url, "Waiting for HLS playlist");
            if !shutdown.sleep(self.retry.min(deadline - now)) {
                return Err(CaptureError::Cancelled { url: url.into() });
            }
        }
    }
}

impl VideoSource for HlsSource {
    fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn FrameStream>, CaptureError> {
        let ready = self.wait_for_playlist(url, timeout)?;
        self.inner.open(&ready, timeout)
    }
}

/// A playlist is usable once it lists at least one media segment.
pub fn playlist_ready(body: &str) -> bool {
    body.contains("#EXTINF")
        && body
            .lines()
            .map(str::trim)
            .any(|line| !line.starts_with('#') && line.contains(".ts"))
}

/// Some relays publish `/hls/<name>.m3u8` under `/hls/<name>/<name>.m3u8`.
pub fn nested_variant(url: &str) -> Option<String> {
    let (dir, file) = url.rsplit_once('/')?;
    let stem = file.strip_suffix(".m3u8")?;
    if stem.is_empty() || dir.ends_with(&format!("/{stem}")) {
        return None;
    }
    Some(format!("{dir}/{stem}/{file}"))
}
