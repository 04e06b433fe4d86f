use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

pub(crate) struct DispatcherMetrics {
    pub ticks: Counter<u64>,
    pub suppressed: Counter<u64>,
    pub requests: Counter<u64>,
    pub failures: Counter<u64>,
    pub alerts: Counter<u64>,
    pub request_duration: Histogram<f64>,
}

impl DispatcherMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0];

        Self {
            ticks: meter
                .u64_counter("detection_ticks_total")
                .with_description("Sampling ticks that found a frame")
                .build(),
            suppressed: meter
                .u64_counter("detection_suppressed_total")
                .with_description("Ticks skipped because the scene was static")
                .build(),
            requests: meter
                .u64_counter("detector_requests_total")
                .with_description("Frames sent to the detector")
                .build(),
            failures: meter
                .u64_counter("detector_failures_total")
                .with_description("Detector calls that timed out or failed")
                .build(),
            alerts: meter
                .u64_counter("fire_alerts_total")
                .with_description("New fire alerts raised")
                .build(),
            request_duration: meter
                .f64_histogram("detector_request_duration_seconds")
                .with_description("Round trip of one detector call")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    pub fn failure(&self, kind: &'static str) {
        self.failures.add(1, &[KeyValue::new("kind", kind)]);
    }
}
