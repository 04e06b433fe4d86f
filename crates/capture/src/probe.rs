use crate::candidates::{StreamCandidate, redact};
use crate::errors::CaptureError;
use crate::source::VideoSource;
use std::time::{Duration, Instant};

/// Open `candidate` and wait for its first decodable frame.
pub fn probe(
    source: &dyn VideoSource,
    candidate: &StreamCandidate,
    timeout: Duration,
) -> Result<(u32, u32), CaptureError> {
    let deadline = Instant::now() + timeout;
    let mut stream = source.open(&candidate.url, timeout)?;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(CaptureError::OpenTimeout {
                url: redact(&candidate.url),
                timeout,
            });
        }
        match stream.next_frame(deadline - now) {
            Ok(Some(frame)) => return Ok((frame.width(), frame.height())),
            Ok(None) => continue,
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Probe every candidate once, in order, and keep the ones that delivered a
/// frame. The stream is closed again after each probe.
pub fn probe_candidates(
    source: &dyn VideoSource,
    candidates: &[StreamCandidate],
    timeout: Duration,
) -> Vec<StreamCandidate> {
    let mut working = Vec::new();
    for candidate in candidates {
        tracing::info!(stream = %candidate.name, url = %redact(&candidate.url), "Probing stream");
        match probe(source, candidate, timeout) {
            Ok((width, height)) => {
                tracing::info!(stream = %candidate.name, width, height, "Stream working");
                working.push(candidate.clone());
            }
            Err(e) => {
                tracing::warn!(stream = %candidate.name, error = %e, "Stream unavailable");
            }
        }
    }
    working
}

/// Probe the known layouts, then the fallback if none answered.
///
/// An empty result means the camera is unreachable.
pub fn discover_streams(
    source: &dyn VideoSource,
    candidates: &[StreamCandidate],
    fallback: &StreamCandidate,
    timeout: Duration,
) -> Vec<StreamCandidate> {
    let working = probe_candidates(source, candidates, timeout);
    if !working.is_empty() {
        return working;
    }

    tracing::warn!(url = %redact(&fallback.url), "No known stream layout answered, trying base URL");
    probe_candidates(source, std::slice::from_ref(fallback), timeout)
}
