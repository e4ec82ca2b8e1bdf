//! Telecache API - HTTP Layer for Device Telemetry
//!
//! Exposes the ingest and retrieval coordinators from `telecache-storage`
//! over Axum, with PostgreSQL as the durable store and Redis as the
//! cache-aside layer in front of it.
//!
//! Durable writes decide the outcome of every ingest. Cache faults are
//! absorbed on both the write and the read path; only the cached listing
//! depends on the cache being reachable.

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod redis_cache;
pub mod routes;
pub mod telemetry;

// Re-export commonly used types
pub use config::{
    coordinator_config_from_env, coordinator_config_from_lookup, load_env_file, ServerConfig,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_STARTUP_TIMEOUT_SECS,
};
pub use db::{DbConfig, PgDurableStore};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use redis_cache::{CacheConfig, RedisFastCache};
pub use routes::create_api_router;
pub use telemetry::{init_tracing, TelemetryConfig};
