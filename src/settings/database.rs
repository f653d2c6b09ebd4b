//! Database target, credentials, connection properties and pool construction.

use crate::error::ConfigError;
use crate::sql::SqlDialect;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::AnyPool;
use sqlx::ConnectOptions;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Named shared-cache in-memory database; it lives as long as one pooled connection does.
pub const IN_MEMORY_URL: &str = "sqlite:file:profiles?mode=memory&cache=shared";
pub const DEFAULT_USER: &str = "sa";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseTarget {
    InMemory,
    External,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    /// Configured URL with any `jdbc:` prefix removed; None means in-memory.
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    /// Database used when no URL is configured.
    pub memory_url: String,
}

impl DatabaseSettings {
    pub fn in_memory() -> Self {
        DatabaseSettings {
            url: None,
            user: DEFAULT_USER.into(),
            password: String::new(),
            memory_url: IN_MEMORY_URL.into(),
        }
    }

    pub fn external(url: &str, user: &str, password: &str) -> Self {
        DatabaseSettings {
            url: Some(url.strip_prefix("jdbc:").unwrap_or(url).to_string()),
            user: user.into(),
            password: password.into(),
            memory_url: IN_MEMORY_URL.into(),
        }
    }

    pub fn target(&self) -> DatabaseTarget {
        match self.url.as_deref() {
            Some(u) if !u.trim().is_empty() => DatabaseTarget::External,
            _ => DatabaseTarget::InMemory,
        }
    }

    pub fn url(&self) -> &str {
        match self.target() {
            DatabaseTarget::External => self.url.as_deref().unwrap_or(&self.memory_url),
            DatabaseTarget::InMemory => &self.memory_url,
        }
    }

    /// URL to connect with. Server URLs without credentials get the configured user and password.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        let raw = self.url();
        if SqlDialect::from_url(raw) != Some(SqlDialect::Postgres) {
            return Ok(raw.to_string());
        }
        let mut url = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
            key: "JDBC_DATABASE_URL",
            message: e.to_string(),
        })?;
        if url.username().is_empty() && !self.user.is_empty() {
            let invalid = |_| ConfigError::Invalid {
                key: "JDBC_DATABASE_URL",
                message: "url cannot carry credentials".into(),
            };
            url.set_username(&self.user).map_err(invalid)?;
            if !self.password.is_empty() {
                url.set_password(Some(&self.password)).map_err(invalid)?;
            }
        }
        Ok(url.to_string())
    }
}

/// `db.*` connection properties, ordered by key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatabaseProperties(BTreeMap<String, String>);

impl DatabaseProperties {
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.get("db.url")
    }

    pub fn show_sql(&self) -> bool {
        self.get("db.show_sql") == Some("true")
    }

    pub fn batch_fetch_size(&self) -> usize {
        self.get("db.batch_fetch_size").and_then(|v| v.parse().ok()).unwrap_or(100)
    }

    pub fn max_connections(&self) -> u32 {
        self.get("db.max_connections").and_then(|v| v.parse().ok()).unwrap_or(5)
    }

    /// Fixed in-memory property set.
    pub fn in_memory(db: &DatabaseSettings) -> Result<Self, ConfigError> {
        let mut p = DatabaseProperties::default();
        p.set("db.driver", "sqlite");
        p.set("db.dialect", "sqlite");
        p.set("db.show_sql", "true");
        p.set("db.use_scrollable_resultset", "true");
        p.set("db.batch_fetch_size", "100");
        p.set("db.max_connections", "5");
        p.set("db.url", db.connection_url()?);
        p.set("db.user", db.user.clone());
        p.set("db.password", db.password.clone());
        Ok(p)
    }

    /// Base properties from the `[database]` table of `path`, with url/user/password overridden.
    pub fn load(path: &Path, db: &DatabaseSettings) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let doc: toml::Table =
            toml::from_str(&content).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let table = doc
            .get("database")
            .and_then(|v| v.as_table())
            .ok_or_else(|| ConfigError::Load(format!("{}: missing [database] table", path.display())))?;
        let mut p = DatabaseProperties::default();
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            p.set(&format!("db.{}", key), value);
        }
        p.set("db.url", db.connection_url()?);
        p.set("db.user", db.user.clone());
        p.set("db.password", db.password.clone());
        Ok(p)
    }
}

/// Open the application pool. In-memory databases keep one connection open for the life of the pool.
pub async fn connect(props: &DatabaseProperties, target: DatabaseTarget) -> Result<AnyPool, sqlx::Error> {
    sqlx::any::install_default_drivers();
    let url = props.url().unwrap_or(IN_MEMORY_URL);
    let mut options = AnyConnectOptions::from_str(url)?;
    if !props.show_sql() {
        options = options.disable_statement_logging();
    }
    let mut pool = AnyPoolOptions::new().max_connections(props.max_connections());
    if target == DatabaseTarget::InMemory {
        pool = pool.min_connections(1).idle_timeout(None).max_lifetime(None);
    }
    let pool = pool.connect_with(options).await?;
    tracing::info!(driver = props.get("db.driver").unwrap_or("unknown"), ?target, "database pool ready");
    Ok(pool)
}
