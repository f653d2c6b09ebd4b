//! Immutable runtime settings, built once from the environment and passed to every component.

mod analytics;
mod database;

pub use analytics::{AnalyticSettings, AsyncSettings};
pub use database::{connect, DatabaseProperties, DatabaseSettings, DatabaseTarget, DEFAULT_USER, IN_MEMORY_URL};

use crate::analytics::{load_model, AnalyticModel, PhysicalCatalog};
use crate::datastore::{
    AggregationStore, ConfigStore, DataStoreChain, MetadataStore, PersistenceStore, SearchStore,
};
use crate::error::{AppError, ConfigError};
use crate::filters::CorsSettings;
use crate::hooks::HookRegistry;
use crate::search::SearchSettings;
use crate::sql::SqlDialect;
use sqlx::AnyPool;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_RESOURCE_DIR: &str = "resources";
/// Deployment context selecting which change sets run.
pub const DEPLOYMENT_CONTEXT: &str = "db1";

#[derive(Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub port: u16,
    pub resource_dir: PathBuf,
    pub cors: CorsSettings,
    pub analytics: AnalyticSettings,
    pub async_query: AsyncSettings,
    pub search: SearchSettings,
    pub enable_swagger: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank values take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user = var("JDBC_DATABASE_USERNAME").unwrap_or_else(|| DEFAULT_USER.into());
        let password = lookup("JDBC_DATABASE_PASSWORD").unwrap_or_default();
        let database = match var("JDBC_DATABASE_URL") {
            Some(url) => DatabaseSettings::external(&url, &user, &password),
            None => DatabaseSettings {
                user,
                password,
                ..DatabaseSettings::in_memory()
            },
        };
        if database.target() == DatabaseTarget::External
            && SqlDialect::from_url(database.url()) != Some(SqlDialect::Postgres)
        {
            return Err(ConfigError::Invalid {
                key: "JDBC_DATABASE_URL",
                message: format!("unsupported external database '{}'", database.url()),
            });
        }

        let port = match var("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                message: format!("'{}' is not a port number", p),
            })?,
            None => DEFAULT_PORT,
        };
        let resource_dir = PathBuf::from(var("RESOURCE_DIR").unwrap_or_else(|| DEFAULT_RESOURCE_DIR.into()));
        let cors = var("CORS_ALLOWED_ORIGINS")
            .map(|list| CorsSettings::with_origins(&list))
            .unwrap_or_default();
        let config_api = var("DYNAMIC_CONFIG_API_ENABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Ok(Settings::new(database, port, resource_dir, cors, config_api))
    }

    /// In-memory settings on a specific memory database, rooted at `resource_dir`. For tests
    /// that each need their own database.
    pub fn in_memory(resource_dir: impl Into<PathBuf>, memory_url: &str) -> Self {
        let database = DatabaseSettings {
            memory_url: memory_url.to_string(),
            ..DatabaseSettings::in_memory()
        };
        Settings::new(database, 0, resource_dir.into(), CorsSettings::default(), false)
    }

    fn new(database: DatabaseSettings, port: u16, resource_dir: PathBuf, cors: CorsSettings, config_api: bool) -> Self {
        let dialect = dialect_for(database.target());
        Settings {
            analytics: AnalyticSettings {
                dynamic_model_config: true,
                dynamic_model_config_api: config_api,
                dynamic_config_path: resource_dir.join("analytics"),
                dialect,
            },
            database,
            port,
            resource_dir,
            cors,
            async_query: AsyncSettings::default(),
            search: SearchSettings::default(),
            enable_swagger: true,
        }
    }

    pub fn resolve_database_target(&self) -> DatabaseTarget {
        self.database.target()
    }

    pub fn select_sql_dialect(&self) -> SqlDialect {
        dialect_for(self.resolve_database_target())
    }

    /// Connection properties: the fixed in-memory set, or `dbconfig.toml` for an external server.
    pub fn database_properties(&self) -> Result<DatabaseProperties, ConfigError> {
        match self.resolve_database_target() {
            DatabaseTarget::InMemory => DatabaseProperties::in_memory(&self.database),
            DatabaseTarget::External => DatabaseProperties::load(&self.resource_dir.join("dbconfig.toml"), &self.database),
        }
    }

    /// Canonical `<resources>/static`; must exist and be a directory.
    pub fn static_resource_root(&self) -> Result<PathBuf, ConfigError> {
        let path = self.resource_dir.join("static");
        match std::fs::canonicalize(&path) {
            Ok(p) if p.is_dir() => Ok(p),
            _ => Err(ConfigError::MissingResource { path }),
        }
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.resource_dir.join("db").join("changelog").join("changelog.json")
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Search over persistence first, then the optional config store, metadata and aggregation.
    pub async fn build_data_store_chain(&self, pool: AnyPool, hooks: Arc<HookRegistry>) -> Result<DataStoreChain, AppError> {
        let dialect = self.select_sql_dialect();
        let props = self.database_properties()?;
        let catalog = PhysicalCatalog::profiles();

        let persistence = Arc::new(PersistenceStore::new(pool.clone(), dialect, props.batch_fetch_size()));
        let mut chain = DataStoreChain::new(hooks);
        chain.push(Arc::new(SearchStore::open(persistence, self.search.clone()).await?));

        let path = &self.analytics.dynamic_config_path;
        if self.analytics.dynamic_model_config_api {
            chain.push(Arc::new(ConfigStore::new(path.clone(), catalog.clone())));
        }
        let model = if self.analytics.dynamic_model_config {
            load_model(path, &catalog).await?
        } else {
            AnalyticModel::default()
        };
        let model = Arc::new(model);
        chain.push(Arc::new(MetadataStore::new(model.clone(), dialect)));
        chain.push(Arc::new(AggregationStore::new(pool, dialect, model, catalog)));
        tracing::info!(stores = ?chain.store_names(), "data store chain built");
        Ok(chain)
    }
}

fn dialect_for(target: DatabaseTarget) -> SqlDialect {
    match target {
        DatabaseTarget::InMemory => SqlDialect::Embedded,
        DatabaseTarget::External => SqlDialect::Postgres,
    }
}
