//! Feature flags for analytic models and asynchronous queries.

use crate::sql::SqlDialect;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticSettings {
    /// Load analytic tables from `dynamic_config_path`.
    pub dynamic_model_config: bool,
    /// Expose the `config` model for editing those files over the API.
    pub dynamic_model_config_api: bool,
    pub dynamic_config_path: PathBuf,
    pub dialect: SqlDialect,
}

/// Asynchronous query support. Reported but not served while disabled.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AsyncSettings {
    pub enabled: bool,
    pub cleanup: bool,
    pub export: bool,
}

impl Default for AsyncSettings {
    fn default() -> Self {
        AsyncSettings {
            enabled: false,
            cleanup: true,
            export: false,
        }
    }
}
