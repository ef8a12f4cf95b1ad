use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Request-level instruments. No-ops unless a meter provider is installed.
#[derive(Clone)]
pub struct Metrics {
    requests: Counter<u64>,
    errors: Counter<u64>,
    inference_duration: Histogram<f64>,
    detections: Counter<u64>,
}

impl Metrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];

        Self {
            requests: meter
                .u64_counter("gateway_requests_total")
                .with_description("Prediction requests received")
                .build(),
            errors: meter
                .u64_counter("gateway_errors_total")
                .with_description("Prediction requests that failed")
                .build(),
            inference_duration: meter
                .f64_histogram("gateway_inference_duration_seconds")
                .with_description("Model forward pass time per request")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            detections: meter
                .u64_counter("gateway_detections_total")
                .with_description("Detections returned to clients")
                .build(),
        }
    }

    pub fn record_request(&self, endpoint: &'static str) {
        self.requests.add(1, &[KeyValue::new("endpoint", endpoint)]);
    }

    pub fn record_error(&self, endpoint: &'static str, kind: &'static str) {
        self.errors.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint),
                KeyValue::new("kind", kind),
            ],
        );
    }

    pub fn record_inference(&self, endpoint: &'static str, seconds: f64, detections: usize) {
        let attrs = [KeyValue::new("endpoint", endpoint)];
        self.inference_duration.record(seconds, &attrs);
        self.detections.add(detections as u64, &attrs);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new("gateway")
    }
}
