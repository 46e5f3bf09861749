//! Prometheus text exposition for a service-owned registry.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, Registry, TextEncoder};

pub fn encode_metrics(registry: &Registry) -> Response {
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error=%e, "metrics encode failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}
