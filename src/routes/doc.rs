//! OpenAPI document at `/doc`.

use crate::entity::{Profile, ProfileAttributes};
use crate::handlers::resource;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "tech-teams", description = "Profile directory with search and analytics"),
    paths(resource::list, resource::read, resource::create, resource::update, resource::delete),
    components(schemas(Profile, ProfileAttributes))
)]
pub struct ApiDoc;

pub fn doc_routes() -> Router {
    Router::new().route("/doc", get(|| async { Json(ApiDoc::openapi()) }))
}
