#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tech_teams::{Application, Settings};
use tower::ServiceExt;

pub fn resources() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")
}

/// A private named in-memory database for one test.
pub fn memory_url() -> String {
    format!("sqlite:file:test-{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple())
}

pub fn settings() -> Settings {
    Settings::in_memory(resources(), &memory_url())
}

pub async fn app() -> Application {
    Application::build(settings()).await.expect("application builds")
}

pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}

pub async fn create_profile(router: &Router, attributes: Value) -> Value {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/v1/profiles",
        Some(serde_json::json!({"data": {"type": "profiles", "attributes": attributes}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

/// Retry `check` until it returns true or two seconds pass. The search index is refreshed
/// asynchronously.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
