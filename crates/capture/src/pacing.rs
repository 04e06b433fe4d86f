use std::time::{Duration, Instant};

/// Caps the publish rate of a reader. Frames arriving before the next slot
/// are dropped rather than queued.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    /// A non-positive or non-finite `max_fps` disables pacing.
    pub fn new(max_fps: f64) -> Self {
        let interval = if max_fps.is_finite() && max_fps > 0.0 {
            Duration::from_secs_f64(1.0 / max_fps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a frame arriving at `now` may be published.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last slot, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
