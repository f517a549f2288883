use axum::http::StatusCode;
use prometheus::{Encoder, TextEncoder};

/// GET /metrics: Prometheus scrape endpoint (expose internally only).
pub async fn metrics_handler() -> Result<String, StatusCode> {
    // Touch the auth counters so the family is exported before the first event.
    lazy_static::initialize(&crate::services::metrics::AUTH_EVENTS_COUNTER);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
