//! Prometheus Metrics Definitions
//!
//! HTTP request metrics recorded by the middleware live in the global
//! registry. Coordinator counters are rendered per scrape from the
//! [`CoordinatorStats`] behind the router serving `/metrics`, so two routers
//! in one process each report their own totals.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::proto::MetricFamily;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, Gauge, HistogramVec,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use telecache_storage::{CoordinatorStats, StatsSnapshot};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TelecacheMetrics>> = Lazy::new(TelecacheMetrics::new);

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

/// Container for all Telecache metrics.
#[derive(Clone)]
pub struct TelecacheMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,
}

impl TelecacheMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "telecache_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "telecache_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Coordinator gauges for one snapshot, gathered from a registry of their own.
pub fn coordinator_families(
    snapshot: &StatsSnapshot,
) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let registry = Registry::new();
    let events = IntGaugeVec::new(
        Opts::new(
            "telecache_coordinator_events",
            "Cache-aside coordinator events since startup",
        ),
        &["event"],
    )?;
    let hit_ratio = Gauge::new(
        "telecache_cache_hit_ratio",
        "Fraction of retrievals answered from the cache",
    )?;
    registry.register(Box::new(events.clone()))?;
    registry.register(Box::new(hit_ratio.clone()))?;

    let totals = [
        ("cache_hit", snapshot.cache_hits),
        ("cache_miss", snapshot.cache_misses),
        ("corrupt_entry", snapshot.corrupt_entries),
        ("cache_read_failure", snapshot.cache_read_failures),
        ("cache_write_failure", snapshot.cache_write_failures),
        ("repopulation", snapshot.repopulations),
        ("store_fallback", snapshot.store_fallbacks),
        ("ingested", snapshot.ingested),
    ];
    for (event, value) in totals {
        events
            .with_label_values(&[event])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }
    hit_ratio.set(snapshot.hit_rate());

    Ok(registry.gather())
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler(State(stats): State<Arc<CoordinatorStats>>) -> impl IntoResponse {
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registry unavailable");
    }

    let mut metric_families = prometheus::gather();
    match coordinator_families(&stats.snapshot()) {
        Ok(families) => metric_families.extend(families),
        Err(e) => tracing::error!(error = %e, "Failed to build coordinator metrics"),
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
