//! REST API Routes Module
//!
//! Includes:
//! - Telemetry ingestion and retrieval (`/iot-data`)
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document

pub mod health;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, http::Uri, middleware::from_fn, routing::get, Router,
};
use telecache_storage::{
    build_coordinators, CoordinatorConfig, CoordinatorStats, SharedDurableStore, SharedFastCache,
};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use health::create_router as health_router;
pub use telemetry::create_router as telemetry_router;

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::route_not_found(uri.path())
}

fn metrics_router(stats: Arc<CoordinatorStats>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(stats)
}

/// Build the full application router over the given store handles.
///
/// Both coordinators share one stats counter, which `/metrics` exports.
pub fn create_api_router(
    store: SharedDurableStore,
    cache: SharedFastCache,
    config: CoordinatorConfig,
    server: &ServerConfig,
) -> Router {
    let call_timeout = config.call_timeout;
    let (ingest, retrieval) = build_coordinators(store.clone(), cache.clone(), config);
    let stats = ingest.stats().clone();

    let telemetry_state = Arc::new(telemetry::TelemetryState::new(ingest, retrieval));
    let health_state = Arc::new(health::HealthState::new(store, cache, call_timeout));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(telemetry::create_router(telemetry_state))
        .merge(health::create_router(health_state))
        .merge(metrics_router(stats));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    router
        .route_layer(from_fn(observability_middleware))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .fallback(route_not_found)
}
