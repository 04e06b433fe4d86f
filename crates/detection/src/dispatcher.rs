use crate::alert::AlertSink;
use crate::client::Detector;
use crate::config::DispatcherConfig;
use crate::details::FrameDetails;
use crate::metrics::DispatcherMetrics;
use crate::scene::{BoxVerdict, FrameVerdict, SceneChangeGate};
use crate::stats::{DetectionState, ResponseRecord};
use capture::{Frame, FrameBuffer};
use chrono::Utc;
use common::Shutdown;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A named stream the dispatcher may sample from.
#[derive(Debug, Clone)]
pub struct SamplingStream {
    pub name: String,
    pub buffer: Arc<FrameBuffer>,
}

impl SamplingStream {
    pub fn new(name: impl Into<String>, buffer: Arc<FrameBuffer>) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }
}

/// Order `streams` by `preference`, keeping the remaining ones in their
/// original order. Preferred names that are not present are ignored.
pub fn sampling_order(streams: Vec<SamplingStream>, preference: &[String]) -> Vec<SamplingStream> {
    let rank = |s: &SamplingStream| {
        preference
            .iter()
            .position(|p| *p == s.name)
            .unwrap_or(preference.len())
    };
    let mut ordered = streams;
    // Stable sort keeps probe order within the same rank.
    ordered.sort_by_key(rank);
    ordered
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NoFrame,
    Suppressed,
    EncodeFailed,
    DetectorFailed,
    NoFire,
    Alert,
    StaticRepeat,
}

/// Periodic sampler: snapshot, gate, detect, record.
pub struct Dispatcher<D: Detector> {
    detector: D,
    streams: Vec<SamplingStream>,
    gate: SceneChangeGate,
    state: Arc<DetectionState>,
    alerts: Option<Box<dyn AlertSink>>,
    config: DispatcherConfig,
    metrics: DispatcherMetrics,
    frames_sampled: u64,
}

impl<D: Detector> Dispatcher<D> {
    /// `streams` must already be in sampling order.
    pub fn new(
        detector: D,
        streams: Vec<SamplingStream>,
        gate: SceneChangeGate,
        state: Arc<DetectionState>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            detector,
            streams,
            gate,
            state,
            alerts: None,
            config,
            metrics: DispatcherMetrics::new("detection"),
            frames_sampled: 0,
        }
    }

    pub fn with_alert_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn gate(&self) -> &SceneChangeGate {
        &self.gate
    }

    /// Latest frame of the first stream that has one.
    fn sample(&self) -> Option<(&str, Arc<Frame>)> {
        self.streams
            .iter()
            .find_map(|s| s.buffer.snapshot().map(|f| (s.name.as_str(), f)))
    }

    pub fn tick(&mut self) -> TickOutcome {
        let Some((stream, frame)) = self.sample() else {
            tracing::info!("No frame available from any stream");
            return TickOutcome::NoFrame;
        };
        let stream = stream.to_string();

        self.metrics.ticks.add(1, &[]);
        self.frames_sampled += 1;
        let details = FrameDetails::of(&frame, self.frames_sampled);
        details.log();
        self.state.record_frame(details);

        if let FrameVerdict::Suppress { static_frames } = self.gate.observe_frame(Arc::clone(&frame)) {
            self.metrics.suppressed.add(1, &[]);
            tracing::info!(static_frames, "Static scene, skipping detector call");
            return TickOutcome::Suppressed;
        }

        let jpeg = match frame.to_jpeg(self.config.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode frame");
                return TickOutcome::EncodeFailed;
            }
        };

        tracing::debug!(stream = %stream, bytes = jpeg.len(), "Sending frame to detector");
        self.metrics.requests.add(1, &[]);
        let started = Instant::now();
        let result = self.detector.detect(jpeg);
        self.metrics
            .request_duration
            .record(started.elapsed().as_secs_f64(), &[]);

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.metrics.failure(e.kind());
                tracing::warn!(error = %e, "Detector call failed");
                self.state.record_failure(Utc::now(), e.summary());
                self.gate.clear_boxes();
                return TickOutcome::DetectorFailed;
            }
        };

        let verdict = self.gate.observe_detection(&result);
        let fire_detected = result.fire_detected();
        tracing::info!(
            status = result.status,
            fire_detected,
            response = %result.body.trim(),
            "Detector response"
        );

        self.state.record_response(ResponseRecord {
            timestamp: result.received_at,
            response: result.body.clone(),
            fire_detected,
            alerted: verdict == BoxVerdict::NewAlert,
        });

        match verdict {
            BoxVerdict::NoFire => TickOutcome::NoFire,
            BoxVerdict::StaticRepeat { iou, repeats } => {
                tracing::info!(iou, repeats, "Static fire position, not alerting");
                TickOutcome::StaticRepeat
            }
            BoxVerdict::NewAlert => {
                self.metrics.alerts.add(1, &[]);
                tracing::warn!(stream = %stream, "FIRE DETECTED");
                if let Some(sink) = &self.alerts
                    && let Err(e) = sink.fire_detected(result.received_at, &result.body)
                {
                    tracing::error!(error = %e, "Failed to write fire alert");
                }
                TickOutcome::Alert
            }
        }
    }

    /// Tick every interval until shutdown. Tick time counts against the interval.
    pub fn run(mut self, shutdown: &Shutdown) {
        let names: Vec<_> = self.streams.iter().map(|s| s.name.as_str()).collect();
        tracing::info!(
            interval = ?self.config.interval,
            streams = ?names,
            "Detection dispatcher starting"
        );

        let mut ticks = 0u64;
        while !shutdown.is_triggered() {
            let started = Instant::now();
            let outcome = self.tick();
            ticks += 1;
            tracing::trace!(?outcome, ticks, "Tick complete");

            let remaining = self.config.interval.saturating_sub(started.elapsed());
            if !shutdown.sleep(remaining) {
                break;
            }
        }

        tracing::info!(ticks, "Detection dispatcher stopped");
    }
}

impl<D: Detector + 'static> Dispatcher<D> {
    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || self.run(&shutdown))
    }
}
