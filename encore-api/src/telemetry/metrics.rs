//! Prometheus Metrics Definitions
//!
//! Defines the ENCORE metrics and exposes a /metrics endpoint for scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use encore_storage::{CacheStats, ReadSource};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::Arc;

use crate::cached_db::CachedCatalog;
use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Store query latency buckets (seconds)
const STORE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<EncoreMetrics>> = Lazy::new(EncoreMetrics::new);

/// The global metrics, if registration succeeded.
pub fn metrics() -> Option<&'static EncoreMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all ENCORE metrics.
#[derive(Clone)]
pub struct EncoreMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Catalog read counter - labels: operation, outcome (hit/miss/coalesced)
    pub cache_lookups_total: CounterVec,

    /// Cache counters sampled at scrape time - labels: counter
    pub cache_state: GaugeVec,

    /// Store query counter - labels: operation, status
    pub store_queries_total: CounterVec,

    /// Store query duration histogram - labels: operation
    pub store_query_duration_seconds: HistogramVec,
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

impl EncoreMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "encore_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "encore_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            cache_lookups_total: register_counter_vec!(
                "encore_cache_lookups_total",
                "Catalog reads by cache outcome",
                &["operation", "outcome"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            cache_state: register_gauge_vec!(
                "encore_cache_state",
                "Read-through cache counters since startup",
                &["counter"]
            )
            .map_err(|e| registration_error("cache_state", e))?,

            store_queries_total: register_counter_vec!(
                "encore_store_queries_total",
                "Total number of catalog store queries",
                &["operation", "status"]
            )
            .map_err(|e| registration_error("store_queries_total", e))?,

            store_query_duration_seconds: register_histogram_vec!(
                "encore_store_query_duration_seconds",
                "Catalog store query duration in seconds",
                &["operation"],
                STORE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("store_query_duration_seconds", e))?,
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

    /// Record where a catalog read was answered from.
    pub fn record_cache_lookup(&self, operation: &str, source: ReadSource) {
        self.cache_lookups_total
            .with_label_values(&[operation, source.as_str()])
            .inc();
    }

    /// Record a store query.
    pub fn record_store_query(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.store_queries_total
            .with_label_values(&[operation, status])
            .inc();
        self.store_query_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Copy the cache counters into the gauges.
    pub fn observe_cache_stats(&self, stats: &CacheStats) {
        let samples = [
            ("hits", stats.hits),
            ("misses", stats.misses),
            ("coalesced", stats.coalesced),
            ("store_reads", stats.store_reads),
            ("errors", stats.errors),
            ("populates_skipped", stats.populates_skipped),
        ];
        for (counter, value) in samples {
            self.cache_state
                .with_label_values(&[counter])
                .set(value as f64);
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(catalog): State<Arc<CachedCatalog>>) -> impl IntoResponse {
    if let Some(metrics) = metrics() {
        metrics.observe_cache_stats(&catalog.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
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
