#![allow(dead_code)]
//! Router over in-memory stores with direct handles for fault injection.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use telecache_api::{create_api_router, ApiError, ServerConfig};
use telecache_storage::{CoordinatorConfig, InMemoryDurableStore, InMemoryFastCache};
use tower::ServiceExt;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn error(&self) -> ApiError {
        serde_json::from_slice(&self.body).expect("response body is an ApiError")
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryDurableStore>,
    pub cache: Arc<InMemoryFastCache>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default(), ServerConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig, server: ServerConfig) -> Self {
        let store = Arc::new(InMemoryDurableStore::new());
        let cache = Arc::new(InMemoryFastCache::new());
        let router = create_api_router(store.clone(), cache.clone(), config, &server);
        Self {
            store,
            cache,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, body: impl Into<String>) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/iot-data")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.into()))
            .expect("valid request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }
}
