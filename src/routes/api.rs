//! Resource routes under `/api/v1`. The model segment is resolved by the data store chain.

use crate::handlers::resource::{create, delete, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub const API_PREFIX: &str = "/api/v1";

pub fn api_routes(state: AppState) -> Router {
    let resources = Router::new()
        .route("/:model", get(list).post(create))
        .route("/:model/:id", get(read).patch(update).delete(delete))
        .with_state(state);
    Router::new().nest(API_PREFIX, resources)
}
