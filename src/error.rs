//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration failures. All of these abort the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing resource: {}", path.display())]
    MissingResource { path: PathBuf },
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("migration connection: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("changelog: {0}")]
    Changelog(String),
    #[error("change set {id} was modified after it was applied (checksum {expected} != {actual})")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("change set {id}: {source}")]
    Apply {
        id: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("read only: {0}")]
    ReadOnly(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("search index: {0}")]
    Search(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<tantivy::TantivyError> for AppError {
    fn from(e: tantivy::TantivyError) -> Self {
        AppError::Search(e.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::ReadOnly(_) => (StatusCode::METHOD_NOT_ALLOWED, "read_only"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Search(_) => (StatusCode::INTERNAL_SERVER_ERROR, "search_error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_maps_to_method_not_allowed() {
        let (status, code) = AppError::ReadOnly("table".into()).status_and_code();
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(code, "read_only");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, _) = AppError::Db(sqlx::Error::RowNotFound).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_resource_names_the_path() {
        let err = ConfigError::MissingResource {
            path: PathBuf::from("resources/static"),
        };
        assert_eq!(err.to_string(), "missing resource: resources/static");
    }
}
