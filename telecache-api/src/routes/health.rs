//! Health Check Endpoints
//!
//! Provides Kubernetes-compatible health check endpoints:
//! - /health/ping - Simple liveness check
//! - /health/ready - Durable store and cache connectivity check
//! - /health/live - Process alive check
//!
//! Readiness is `unhealthy` (503) when the durable store is down and
//! `degraded` (200) when only the cache is down, since reads and writes still
//! succeed without it.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use telecache_storage::{
    with_cache_deadline, with_store_deadline, SharedDurableStore, SharedFastCache,
};

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_check(result: Result<u64, String>) -> Self {
        match result {
            Ok(latency) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency),
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e),
            },
        }
    }
}

/// Combine component states. The durable store decides availability.
pub fn overall_status(database: HealthStatus, cache: HealthStatus) -> HealthStatus {
    match (database, cache) {
        (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
        (HealthStatus::Healthy, _) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub store: SharedDurableStore,
    pub cache: SharedFastCache,
    pub check_timeout: Duration,
    pub start_time: Instant,
}

impl HealthState {
    pub fn new(store: SharedDurableStore, cache: SharedFastCache, check_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            check_timeout,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
))]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (store and cache connectivity)
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready, possibly without its cache", body = HealthResponse),
        (status = 503, description = "Durable store is unreachable", body = HealthResponse),
    ),
))]
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let database = ComponentHealth::from_check(check_database(&state).await);
    let cache = ComponentHealth::from_check(check_cache(&state).await);

    let status = overall_status(database.status, cache.status);
    if status != HealthStatus::Healthy {
        tracing::warn!(
            database = ?database.status,
            cache = ?cache.status,
            "Readiness check not healthy"
        );
    }

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            database,
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

async fn check_database(state: &HealthState) -> Result<u64, String> {
    let start = Instant::now();
    with_store_deadline("ping", state.check_timeout, state.store.ping())
        .await
        .map(|_| start.elapsed().as_millis() as u64)
        .map_err(|e| format!("Database check failed: {}", e))
}

async fn check_cache(state: &HealthState) -> Result<u64, String> {
    let start = Instant::now();
    with_cache_deadline("ping", state.check_timeout, state.cache.ping())
        .await
        .map(|_| start.elapsed().as_millis() as u64)
        .map_err(|e| format!("Cache check failed: {}", e))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router.
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health/ping", get(ping))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}
