//! Common routes: health, readiness, version, info.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;

/// Liveness and readiness report. `database` is only checked by `/ready`.
#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stores: Option<Vec<&'static str>>,
}

async fn health() -> Json<StatusReport> {
    Json(StatusReport {
        status: "ok",
        database: None,
        stores: None,
    })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<StatusReport>) {
    let stores = Some(state.chain.store_names());
    match sqlx::query("SELECT 1").fetch_optional(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(StatusReport {
                status: "ok",
                database: Some("ok"),
                stores,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(StatusReport {
                    status: "degraded",
                    database: Some("unavailable"),
                    stores,
                }),
            )
        }
    }
}

fn build_info() -> serde_json::Value {
    json!({ "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") })
}

async fn version() -> Json<serde_json::Value> {
    Json(build_info())
}

/// Version plus the features this instance runs with.
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let s = &state.settings;
    let mut body = build_info();
    body["features"] = json!({
        "database": {
            "target": format!("{:?}", s.resolve_database_target()),
            "dialect": s.select_sql_dialect(),
        },
        "stores": state.chain.store_names(),
        "analytics": s.analytics,
        "asyncQuery": s.async_query,
        "search": {
            "workers": s.search.workers,
            "refreshIntervalMs": s.search.refresh_interval.as_millis() as u64,
            "minGram": s.search.min_gram,
            "maxGram": s.search.max_gram,
        },
        "swagger": s.enable_swagger,
    });
    Json(body)
}

/// GET /health, /ready (database check), /version, /info.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/info", get(info))
        .with_state(state)
}
