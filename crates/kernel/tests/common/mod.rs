#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every test builds its own [`TestApp`] over a fresh in-memory store and
//! drives the REAL kernel router, so tests never share records.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use procura_kernel::config::SequenceStrategy;
use procura_kernel::store::MemoryStore;
use procura_kernel::{AppState, Config, routes};
use procura_test_utils::TestRecord;

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// App whose document numbers come from the atomic counter.
    pub fn with_counter_sequences() -> Self {
        Self::with_config(Config {
            sequence_strategy: SequenceStrategy::Counter,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_store(store.clone(), &config);
        let router = routes::api_router().with_state(state);
        Self { router, store }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.request(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, body)).await
    }

    pub async fn put(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send(json_request("PUT", uri, body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Create a record through the API and return the stored document.
    pub async fn create(&self, entity: &str, record: &TestRecord) -> Value {
        let (status, body) = self
            .post(&format!("/api/{entity}"), &record.to_payload())
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["data"].clone()
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
