//! Telecache Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing-subscriber` and Prometheus metrics for
//! the API layer. Neither needs an external collector.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{coordinator_families, metrics_handler, TelecacheMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, LogFormat, TelemetryConfig, DEFAULT_LOG_FILTER};
