mod common;

use axum::http::Method;
use common::{app, create_profile, send};
use serde_json::json;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
    }
}

#[tokio::test]
async fn only_committed_creates_are_logged() {
    let sink = Captured::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = app().await;
    let router = app.router();

    let created = create_profile(&router, json!({"name": "Katherine Johnson"})).await;
    assert_eq!(sink.count("saved profile"), 1);
    assert_eq!(sink.count("Katherine Johnson"), 1);

    let url = format!("/api/v1/profiles/{}", created["id"].as_str().unwrap());
    send(
        &router,
        Method::PATCH,
        &url,
        Some(json!({"data": {"type": "profiles", "attributes": {"experience": 30}}})),
    )
    .await;
    send(&router, Method::DELETE, &url, None).await;

    // Rejected creates never reach the hook.
    send(
        &router,
        Method::POST,
        "/api/v1/profiles",
        Some(json!({"data": {"type": "profiles", "attributes": {"nickname": "kj"}}})),
    )
    .await;
    assert_eq!(sink.count("saved profile"), 1);
}
