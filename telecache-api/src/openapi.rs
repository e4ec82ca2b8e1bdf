//! OpenAPI Specification for the Telecache API
//!
//! Built with utoipa from the route annotations and schema derives.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{health, telemetry};
use crate::telemetry::metrics;
use telecache_core::TelemetryRecord;

/// OpenAPI document for the Telecache API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Telecache API",
        version = "0.1.0",
        description = "Device telemetry ingestion with a PostgreSQL system of record and a Redis cache-aside read path",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Telemetry", description = "Ingestion and retrieval of device readings"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        telemetry::ingest_telemetry,
        telemetry::get_latest,
        telemetry::list_cached,
        telemetry::get_history,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            TelemetryRecord,
            telemetry::IngestResponse,
            ApiError, ErrorCode,
            HealthResponse, HealthStatus, HealthDetails, ComponentHealth,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        let openapi = Self::openapi();
        serde_json::to_string_pretty(&openapi)
    }
}
