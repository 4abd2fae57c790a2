#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlgate_db::{DbRuntimeSettings, Store};
use sqlgate_server::{app, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

/// A router over a freshly initialized database in a temp directory.
pub struct TestApp {
    pub router: Router,
    pub store: Store,
    _dir: TempDir,
}

pub fn test_app() -> TestApp {
    test_app_with(true)
}

pub fn test_app_with(expose_db_errors: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = Store::new(
        dir.path().join("database").join("database.db"),
        DbRuntimeSettings::default(),
    );
    store.initialize().expect("failed to initialize database");

    let router = app(AppState {
        store: store.clone(),
        expose_db_errors,
    });

    TestApp {
        router,
        store,
        _dir: dir,
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, req).await
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, req).await
}

pub async fn execute(router: &Router, sql: &str) -> (StatusCode, Value) {
    post_json(router, "/execute", serde_json::json!({ "query": sql })).await
}
