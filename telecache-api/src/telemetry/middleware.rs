//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every routed request in an `http_request` span, records Prometheus
//! metrics and logs completion. Metrics are labelled by the matched route
//! template (`/iot-data/:device_id`), never the raw path, so device ids do
//! not become label values.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

/// Label used when no route matched.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template for metrics and spans.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Observability middleware for Axum.
///
/// Install with `route_layer` so the matched path is available.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        path = %path,
        route = %route,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_middleware_passes_response_through() {
        let app = Router::new()
            .route("/things/:id", get(|| async { StatusCode::ACCEPTED }))
            .route_layer(middleware::from_fn(observability_middleware));

        let response = app
            .oneshot(Request::builder().uri("/things/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let metrics = METRICS.as_ref().unwrap();
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/things/:id", "202"])
            .get();
        assert!(count >= 1.0);
    }

    #[test]
    fn test_route_label_without_match() {
        let request = Request::builder().uri("/nowhere").body(axum::body::Body::empty()).unwrap();
        assert_eq!(route_label(&request), UNMATCHED_ROUTE);
    }
}
