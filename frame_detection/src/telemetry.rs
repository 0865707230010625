use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    inference_duration: HistogramVec,
    detection_counter: IntCounterVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries(&[(10, 100, 10), (100, 500, 50), (500, 2000, 250)]);
        let inference_duration = HistogramVec::new(
            HistogramOpts::new(
                "inference_duration_ms",
                "Duration of model inference in milliseconds",
            )
            .buckets(boundaries),
            &["route"],
        )?;

        let detection_counter = IntCounterVec::new(
            Opts::new("detections_total", "Total number of objects detected"),
            &["route"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;
        registry.register(Box::new(detection_counter.clone()))?;

        Ok(Metrics {
            request_counter,
            inference_duration,
            detection_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_inference_duration(&self, duration_ms: u64, route: &str) {
        self.inference_duration
            .with_label_values(&[route])
            .observe(duration_ms as f64);
    }

    pub fn record_detections(&self, count: u64, route: &str) {
        self.detection_counter
            .with_label_values(&[route])
            .inc_by(count);
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| e.to_string())?;

        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

/// Concatenates `(start, end, step)` ranges into sorted, de-duplicated
/// histogram bucket boundaries.
fn generate_boundaries(parts: &[(u32, u32, usize)]) -> Vec<f64> {
    let mut seen = HashSet::new();
    let mut boundaries: Vec<f64> = parts
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step.max(1)))
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect();
    boundaries.sort_by(f64::total_cmp);
    boundaries
}
