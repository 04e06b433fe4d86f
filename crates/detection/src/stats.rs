use crate::details::FrameDetails;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// One detector answer kept in the history ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub timestamp: DateTime<Utc>,
    pub response: String,
    pub fire_detected: bool,
    /// False when the fire was a static repeat of the previous one.
    pub alerted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total_frames_processed: u64,
    pub total_detections: u64,
    pub last_detection: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub current_fire_detected: bool,
    pub last_ai_response: Option<String>,
    pub last_frame: Option<FrameDetails>,
    pub history: VecDeque<ResponseRecord>,
}

impl DetectionStats {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            total_frames_processed: 0,
            total_detections: 0,
            last_detection: None,
            last_check: None,
            current_fire_detected: false,
            last_ai_response: None,
            last_frame: None,
            history: VecDeque::with_capacity(capacity),
        }
    }
}

/// The `/api/fire_status` view of the stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireStatus {
    pub fire_detected: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub total_detections: u64,
    pub last_detection: Option<DateTime<Utc>>,
    pub last_ai_response: Option<String>,
    pub last_frame: Option<FrameDetails>,
}

/// Process-wide detection state. The dispatcher writes through the
/// crate-private mutators; everyone else reads copies.
#[derive(Debug)]
pub struct DetectionState {
    inner: Mutex<DetectionStats>,
    capacity: usize,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl DetectionState {
    pub fn new(history_capacity: usize) -> Self {
        let capacity = history_capacity.max(1);
        Self {
            inner: Mutex::new(DetectionStats::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DetectionStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DetectionStats {
        self.lock().clone()
    }

    pub fn fire_status(&self) -> FireStatus {
        let stats = self.lock();
        FireStatus {
            fire_detected: stats.current_fire_detected,
            last_check: stats.last_check,
            total_checks: stats.total_frames_processed,
            total_detections: stats.total_detections,
            last_detection: stats.last_detection,
            last_ai_response: stats.last_ai_response.clone(),
            last_frame: stats.last_frame.clone(),
        }
    }

    /// History oldest first.
    pub fn history(&self) -> Vec<ResponseRecord> {
        self.lock().history.iter().cloned().collect()
    }

    pub(crate) fn record_frame(&self, details: FrameDetails) {
        let mut stats = self.lock();
        stats.total_frames_processed += 1;
        stats.last_frame = Some(details);
    }

    pub(crate) fn record_response(&self, record: ResponseRecord) {
        let mut stats = self.lock();
        stats.last_check = Some(record.timestamp);
        stats.current_fire_detected = record.fire_detected;
        stats.last_ai_response = Some(record.response.clone());
        if record.alerted {
            stats.total_detections += 1;
            stats.last_detection = Some(record.timestamp);
        }
        if stats.history.len() == self.capacity {
            stats.history.pop_front();
        }
        stats.history.push_back(record);
    }

    /// A failed call: no fire this tick, the anomaly becomes the last response.
    pub(crate) fn record_failure(&self, at: DateTime<Utc>, summary: String) {
        let mut stats = self.lock();
        stats.last_check = Some(at);
        stats.current_fire_detected = false;
        stats.last_ai_response = Some(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(response: &str, fire_detected: bool, alerted: bool) -> ResponseRecord {
        ResponseRecord {
            timestamp: Utc::now(),
            response: response.into(),
            fire_detected,
            alerted,
        }
    }

    #[test]
    fn starts_empty() {
        let status = DetectionState::default().fire_status();
        assert!(!status.fire_detected);
        assert_eq!(status.total_checks, 0);
        assert!(status.last_check.is_none());
        assert!(status.last_ai_response.is_none());
    }

    #[test]
    fn alert_bumps_detection_counters() {
        let state = DetectionState::default();
        let r = record(r#"{"fire_detected": true}"#, true, true);
        let at = r.timestamp;
        state.record_response(r);

        let stats = state.snapshot();
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.last_detection, Some(at));
        assert!(stats.current_fire_detected);
    }

    #[test]
    fn static_repeat_keeps_fire_flag_without_counting() {
        let state = DetectionState::default();
        state.record_response(record("a", true, true));
        state.record_response(record("b", true, false));

        let stats = state.snapshot();
        assert_eq!(stats.total_detections, 1);
        assert!(stats.current_fire_detected);
        assert_eq!(stats.history.len(), 2);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let state = DetectionState::new(3);
        for i in 0..5 {
            state.record_response(record(&i.to_string(), false, false));
        }
        let responses: Vec<_> = state.history().into_iter().map(|r| r.response).collect();
        assert_eq!(responses, ["2", "3", "4"]);
    }

    #[test]
    fn failure_clears_fire_flag_and_records_summary() {
        let state = DetectionState::default();
        state.record_response(record("fire", true, true));
        state.record_failure(Utc::now(), "API Error: 500".into());

        let status = state.fire_status();
        assert!(!status.fire_detected);
        assert_eq!(status.last_ai_response.as_deref(), Some("API Error: 500"));
        assert_eq!(status.total_detections, 1);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn frames_are_counted_separately_from_calls() {
        let state = DetectionState::default();
        let frame = capture::Frame::new(1, 1, capture::PixelFormat::Rgb8, vec![1, 2, 3]).unwrap();
        state.record_frame(FrameDetails::of(&frame, 1));
        state.record_frame(FrameDetails::of(&frame, 2));

        let status = state.fire_status();
        assert_eq!(status.total_checks, 2);
        assert!(status.last_check.is_none());
        assert_eq!(status.last_frame.map(|d| d.frame_number), Some(2));
    }
}
