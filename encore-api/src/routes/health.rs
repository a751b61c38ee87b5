//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Store and cache connectivity
//!
//! The store is required; a failing cache only degrades readiness because
//! reads fall through to the store.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cached_db::CachedCatalog;

/// Bound on each component check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub store: ComponentHealth,
    pub cache: ComponentHealth,
    pub cache_backend: String,
    pub cache_hit_rate: f64,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_check(result: Result<(), String>, started: Instant, failed: HealthStatus) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(error) => Self {
                status: failed,
                latency_ms: None,
                error: Some(error),
            },
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub catalog: Arc<CachedCatalog>,
    pub start_time: Instant,
}

impl HealthState {
    pub fn new(catalog: Arc<CachedCatalog>) -> Self {
        Self {
            catalog,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let started = Instant::now();
    let store_result = match tokio::time::timeout(CHECK_TIMEOUT, state.catalog.ping_store()).await
    {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("store ping timed out after {:?}", CHECK_TIMEOUT)),
    };
    let store = ComponentHealth::from_check(store_result, started, HealthStatus::Unhealthy);

    let started = Instant::now();
    let cache = ComponentHealth::from_check(
        state.catalog.ping_cache(CHECK_TIMEOUT).await,
        started,
        HealthStatus::Degraded,
    );

    let overall = match (store.status, cache.status) {
        (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
        (HealthStatus::Healthy, _) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };

    if overall != HealthStatus::Healthy {
        tracing::warn!(store = ?store.error, cache = ?cache.error, "Readiness check not healthy");
    }

    let response = HealthResponse {
        status: overall,
        message: None,
        details: Some(HealthDetails {
            store,
            cache,
            cache_backend: state.catalog.backend_name().to_string(),
            cache_hit_rate: state.catalog.stats().hit_rate(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

pub fn create_router(catalog: Arc<CachedCatalog>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(Arc::new(HealthState::new(catalog)))
}
