//! Telemetry REST API Routes
//!
//! Ingestion, latest-reading lookup, cached listing and durable history.
//! Handlers parse the request, call a coordinator and map its outcome onto an
//! HTTP response; the cache-aside policy itself lives in `telecache-storage`.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use telecache_core::TelemetryRecord;
use telecache_storage::{IngestCoordinator, ReadPath, RetrievalCoordinator};

use crate::error::ApiResult;
#[cfg(feature = "openapi")]
use crate::error::ApiError;

/// Response header naming the store that answered a per-device read.
pub const SOURCE_HEADER: &str = "x-telecache-source";

/// Acknowledgement body for a successful ingest.
pub const INGEST_MESSAGE: &str = "Data received, stored, and cached";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IngestResponse {
    pub message: String,
}

impl IngestResponse {
    fn received() -> Self {
        Self {
            message: INGEST_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct HistoryParams {
    /// Maximum number of readings, clamped to the configured maximum
    pub limit: Option<usize>,
}

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared application state for telemetry routes.
#[derive(Clone)]
pub struct TelemetryState {
    pub ingest: IngestCoordinator,
    pub retrieval: RetrievalCoordinator,
}

impl TelemetryState {
    pub fn new(ingest: IngestCoordinator, retrieval: RetrievalCoordinator) -> Self {
        Self { ingest, retrieval }
    }
}

fn source_label(source: ReadPath) -> &'static str {
    match source {
        ReadPath::Cache => "cache",
        ReadPath::Store => "store",
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /iot-data - Ingest one telemetry record
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/iot-data",
    tag = "Telemetry",
    request_body = TelemetryRecord,
    responses(
        (status = 201, description = "Record stored durably", body = IngestResponse),
        (status = 400, description = "Malformed body or missing device_id", body = ApiError),
        (status = 413, description = "Body exceeds the size limit", body = ApiError),
        (status = 500, description = "Durable write failed", body = ApiError),
    ),
))]
pub async fn ingest_telemetry(
    State(state): State<Arc<TelemetryState>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body?;
    let record: TelemetryRecord = serde_json::from_slice(&body)?;

    let ack = state.ingest.ingest(record).await?;
    tracing::debug!(
        device_id = %ack.device_id,
        timestamp = ack.timestamp,
        cached = ack.cached,
        "Telemetry ingested"
    );

    // Same acknowledgement whether or not the cache write landed.
    Ok((StatusCode::CREATED, Json(IngestResponse::received())))
}

/// GET /iot-data/{device_id} - Latest reading for a device
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/iot-data/{device_id}",
    tag = "Telemetry",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
    ),
    responses(
        (status = 200, description = "Latest reading", body = TelemetryRecord),
        (status = 404, description = "No telemetry for this device", body = ApiError),
        (status = 500, description = "Durable read failed or stored row is corrupt", body = ApiError),
    ),
))]
pub async fn get_latest(
    State(state): State<Arc<TelemetryState>>,
    device_id: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(device_id) = device_id?;
    let retrieval = state.retrieval.retrieve(&device_id).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                HeaderName::from_static(SOURCE_HEADER),
                source_label(retrieval.source),
            ),
        ],
        retrieval.envelope,
    ))
}

/// GET /iot-data - Every decodable cached reading
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/iot-data",
    tag = "Telemetry",
    responses(
        (status = 200, description = "Cached readings ordered by device id", body = Vec<TelemetryRecord>),
        (status = 500, description = "Cache keys could not be enumerated", body = ApiError),
    ),
))]
pub async fn list_cached(
    State(state): State<Arc<TelemetryState>>,
) -> ApiResult<impl IntoResponse> {
    let records = state.retrieval.list_cached().await?;
    Ok(Json(records))
}

/// GET /iot-data/{device_id}/history - Durable readings, newest first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/iot-data/{device_id}/history",
    tag = "Telemetry",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
        HistoryParams,
    ),
    responses(
        (status = 200, description = "Readings, newest first", body = Vec<TelemetryRecord>),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 404, description = "No telemetry for this device", body = ApiError),
        (status = 500, description = "Durable read failed", body = ApiError),
    ),
))]
pub async fn get_history(
    State(state): State<Arc<TelemetryState>>,
    device_id: Result<Path<String>, PathRejection>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(device_id) = device_id?;
    let Query(params) = params?;
    let records = state.retrieval.history(&device_id, params.limit).await?;
    Ok(Json(records))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the telemetry router.
pub fn create_router(state: Arc<TelemetryState>) -> Router {
    Router::new()
        .route("/iot-data", get(list_cached).post(ingest_telemetry))
        .route("/iot-data/:device_id", get(get_latest))
        .route("/iot-data/:device_id/history", get(get_history))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use telecache_storage::{
        build_coordinators, CoordinatorConfig, InMemoryDurableStore, InMemoryFastCache,
    };
    use tower::ServiceExt;

    fn app() -> (Arc<InMemoryDurableStore>, Arc<InMemoryFastCache>, Router) {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let (ingest, retrieval) =
            build_coordinators(store.clone(), cache.clone(), CoordinatorConfig::default());
        let router = create_router(Arc::new(TelemetryState::new(ingest, retrieval)));
        (store, cache, router)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/iot-data")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_then_read_from_cache() {
        let (_, _, app) = app();
        let body = r#"{"device_id":"d1","device_type":"sensor","timestamp":1000,"data":{"temp":21.5}}"#;

        let response = app.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let ack: IngestResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ack.message, INGEST_MESSAGE);

        let response = app.oneshot(get_req("/iot-data/d1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "cache");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_store_fallback_is_labelled() {
        let (_, cache, app) = app();
        let body = r#"{"device_id":"d1","timestamp":5}"#;
        cache.set_unavailable(true);
        let response = app.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        cache.set_unavailable(false);
        let response = app.oneshot(get_req("/iot-data/d1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "store");
    }

    #[tokio::test]
    async fn test_negative_limit_is_bad_request() {
        let (_, _, app) = app();
        let response = app
            .oneshot(get_req("/iot-data/d1/history?limit=-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(source_label(ReadPath::Cache), "cache");
        assert_eq!(source_label(ReadPath::Store), "store");
    }
}
