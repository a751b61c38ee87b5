//! Shared harness for router tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use encore_api::{
    create_api_router, AdminGuardState, ApiConfig, ApiError, ApiResult, CachedCatalog, ErrorCode,
    UserDirectory, UserProfile,
};
use encore_storage::{CacheBackend, CacheConfig, InMemoryCacheBackend};
use encore_test_utils::CountingStore;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-session";
pub const LISTENER_TOKEN: &str = "listener-session";

/// User directory answering from a fixed token table.
pub struct StubDirectory {
    users: HashMap<String, UserProfile>,
}

impl StubDirectory {
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert(ADMIN_TOKEN.to_string(), profile("u-1", "admin"));
        users.insert(LISTENER_TOKEN.to_string(), profile("u-2", "user"));
        Self { users }
    }
}

fn profile(id: &str, role: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: format!("{id} name"),
        email: format!("{id}@example.com"),
        role: role.to_string(),
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn current_user(&self, token: &str) -> ApiResult<UserProfile> {
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::from_code(ErrorCode::Forbidden))
    }
}

/// A router over a counting store and an in-process cache.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<CountingStore>,
}

impl TestApp {
    pub fn new(store: CountingStore) -> Self {
        Self::with_backend(store, Arc::new(InMemoryCacheBackend::new()))
    }

    pub fn with_backend(store: CountingStore, backend: Arc<dyn CacheBackend>) -> Self {
        let store = Arc::new(store);
        let catalog = Arc::new(CachedCatalog::new(
            store.clone(),
            backend,
            CacheConfig::default(),
        ));
        let guard = AdminGuardState::new(Arc::new(StubDirectory::new()));
        let router = create_api_router(catalog, guard, &ApiConfig::default());
        Self { router, store }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: &Value) -> (StatusCode, Value) {
        self.post_raw(uri, token, body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, token: Option<&str>, body: String) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("token", token);
        }
        let request = builder.body(Body::from(body)).expect("request should build");
        self.send(request).await
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
