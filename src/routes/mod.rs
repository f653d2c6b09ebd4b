pub mod api;
pub mod common;
pub mod doc;

pub use api::{api_routes, API_PREFIX};
pub use common::common_routes;
pub use doc::{doc_routes, ApiDoc};
