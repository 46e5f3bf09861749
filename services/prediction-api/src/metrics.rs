//! Prediction and HTTP metrics, registered on a registry owned by the service instance.

use std::time::Duration;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint { Predict, BatchPredict }

impl Endpoint {
    pub fn label(self) -> &'static str {
        match self { Self::Predict => "predict", Self::BatchPredict => "batch_predict" }
    }
}

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    prediction_requests: IntCounterVec,
    prediction_latency: HistogramVec,
    http_requests: IntCounterVec,
    http_latency: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let prediction_requests = IntCounterVec::new(
            Opts::new("prediction_requests_total", "Total number of prediction requests"), &["endpoint"])?;
        let prediction_latency = HistogramVec::new(
            HistogramOpts::new("prediction_latency_seconds", "Time spent processing prediction requests"), &["endpoint"])?;
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests by method, route and status"), &["method", "handler", "status"])?;
        let http_latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency by method and route"), &["method", "handler"])?;
        registry.register(Box::new(prediction_requests.clone()))?;
        registry.register(Box::new(prediction_latency.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_latency.clone()))?;
        // both endpoint series exist from the first scrape
        for e in [Endpoint::Predict, Endpoint::BatchPredict] {
            prediction_requests.with_label_values(&[e.label()]);
            prediction_latency.with_label_values(&[e.label()]);
        }
        Ok(Self { registry, prediction_requests, prediction_latency, http_requests, http_latency })
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub fn record_request(&self, endpoint: Endpoint) { self.prediction_requests.with_label_values(&[endpoint.label()]).inc(); }
    pub fn observe_latency(&self, endpoint: Endpoint, elapsed: Duration) { self.prediction_latency.with_label_values(&[endpoint.label()]).observe(elapsed.as_secs_f64()); }
    pub fn requests(&self, endpoint: Endpoint) -> u64 { self.prediction_requests.with_label_values(&[endpoint.label()]).get() }
    pub fn latency_samples(&self, endpoint: Endpoint) -> u64 { self.prediction_latency.with_label_values(&[endpoint.label()]).get_sample_count() }

    pub fn record_http(&self, method: &str, handler: &str, status: u16, elapsed: Duration) {
        self.http_requests.with_label_values(&[method, handler, &status.to_string()]).inc();
        self.http_latency.with_label_values(&[method, handler]).observe(elapsed.as_secs_f64());
    }

    pub fn http_requests(&self, method: &str, handler: &str, status: u16) -> u64 {
        self.http_requests.with_label_values(&[method, handler, &status.to_string()]).get()
    }
}
