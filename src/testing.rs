//! Router-level test harness over the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::FromRef,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::app::build_app;
use crate::auth::jwt::JwtKeys;
use crate::auth::repo_types::User;
use crate::auth::services::create_user;
use crate::state::{AppState, FakeStorage};
use crate::store::memory::MemoryStore;

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (state, storage) = AppState::fake_parts(store.clone());
        Self {
            router: build_app(state.clone()),
            state,
            store,
            storage,
        }
    }

    /// A fresh account plus a valid access token for it.
    pub async fn user(&self, email: &str) -> (User, String) {
        self.user_with_password(email, "testpass123").await
    }

    pub async fn user_with_password(&self, email: &str, password: &str) -> (User, String) {
        let user = create_user(self.store.as_ref(), email, password, "Test Name")
            .await
            .expect("create test user");
        let token = JwtKeys::from_ref(&self.state)
            .sign_access(user.id)
            .expect("sign test token");
        (user, token)
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("build request");
    app.call(req).await
}

/// POSTs a single-file multipart form.
pub async fn send_multipart(
    app: &TestApp,
    uri: &str,
    token: &str,
    field: &str,
    file_name: &str,
    content: &[u8],
) -> (StatusCode, Value) {
    const BOUNDARY: &str = "recipebook-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build multipart request");
    app.call(req).await
}
