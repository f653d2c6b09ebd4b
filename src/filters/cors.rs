//! Cross-origin policy applied to every response.

use axum::http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone, Debug)]
pub struct CorsSettings {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<HeaderName>,
    pub max_age: Duration,
}

impl Default for CorsSettings {
    fn default() -> Self {
        CorsSettings {
            allowed_origins: Vec::new(),
            allowed_methods: vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS],
            allowed_headers: vec![
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::AUTHORIZATION,
                HeaderName::from_static("x-requested-with"),
            ],
            max_age: Duration::from_secs(3600),
        }
    }
}

impl CorsSettings {
    /// Default policy restricted to a comma separated origin list, as found in `CORS_ALLOWED_ORIGINS`.
    pub fn with_origins(list: &str) -> Self {
        CorsSettings {
            allowed_origins: list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            ..Default::default()
        }
    }

    pub fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods(self.allowed_methods.clone())
            .allow_headers(self.allowed_headers.clone())
            .max_age(self.max_age);
        if self.allowed_origins.is_empty() {
            return layer.allow_origin(Any);
        }
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
