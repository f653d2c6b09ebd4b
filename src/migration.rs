//! Schema migrations from a JSON changelog. Each change set runs in its own transaction and
//! is recorded in `schema_changelog` with a checksum; applied sets are skipped on later runs.

use crate::error::MigrationError;
use crate::settings::DatabaseSettings;
use crate::sql::SqlDialect;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{AnyConnection, Connection, Row};
use std::collections::HashMap;
use std::path::Path;

pub const TRACKING_TABLE: &str = "schema_changelog";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changelog {
    pub change_sets: Vec<ChangeSet>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    /// Deployment contexts this set belongs to; empty means every context.
    #[serde(default)]
    pub context: Vec<String>,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Change {
    pub sql: String,
    /// Dialects (`sqlite`, `postgres`) this statement is for; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dbms: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

impl ChangeSet {
    /// sha256 over the serialized changes, hex encoded.
    pub fn checksum(&self) -> String {
        let bytes = serde_json::to_vec(&self.changes).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    fn in_context(&self, contexts: &[&str]) -> bool {
        self.context.is_empty() || self.context.iter().any(|c| contexts.contains(&c.as_str()))
    }
}

impl Change {
    fn runs_on(&self, dialect: SqlDialect) -> bool {
        self.dbms.is_empty() || self.dbms.iter().any(|d| d == dialect.dialect_type())
    }
}

pub async fn load_changelog(path: &Path) -> Result<Changelog, MigrationError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MigrationError::Changelog(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| MigrationError::Changelog(format!("{}: {}", path.display(), e)))
}

/// Apply every pending change set of `changelog_path` in `contexts` over one direct connection.
pub async fn apply_migrations(
    database: &DatabaseSettings,
    changelog_path: &Path,
    contexts: &[&str],
) -> Result<MigrationReport, MigrationError> {
    sqlx::any::install_default_drivers();
    let url = database
        .connection_url()
        .map_err(|e| MigrationError::Connect(sqlx::Error::Configuration(e.into())))?;
    let dialect = SqlDialect::from_url(&url)
        .ok_or_else(|| MigrationError::Changelog(format!("unsupported database url '{}'", database.url())))?;
    let changelog = load_changelog(changelog_path).await?;

    let mut conn = AnyConnection::connect(&url).await.map_err(MigrationError::Connect)?;
    let report = run(&mut conn, dialect, &changelog, contexts).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "closing migration connection");
    }
    let report = report?;
    tracing::info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        %dialect,
        "migrations complete"
    );
    Ok(report)
}

async fn run(
    conn: &mut AnyConnection,
    dialect: SqlDialect,
    changelog: &Changelog,
    contexts: &[&str],
) -> Result<MigrationReport, MigrationError> {
    let tracking = |source| MigrationError::Apply {
        id: TRACKING_TABLE.to_string(),
        source,
    };
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id VARCHAR(255) NOT NULL, author VARCHAR(255) NOT NULL, \
         checksum VARCHAR(64) NOT NULL, applied_at VARCHAR(64) NOT NULL, PRIMARY KEY (id, author))",
        TRACKING_TABLE
    ))
    .execute(&mut *conn)
    .await
    .map_err(tracking)?;

    let rows = sqlx::query(&format!("SELECT id, author, checksum FROM {}", TRACKING_TABLE))
        .fetch_all(&mut *conn)
        .await
        .map_err(tracking)?;
    let mut applied: HashMap<(String, String), String> = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = (row.try_get("id").map_err(tracking)?, row.try_get("author").map_err(tracking)?);
        applied.insert(key, row.try_get("checksum").map_err(tracking)?);
    }

    let mut report = MigrationReport::default();
    for set in &changelog.change_sets {
        if !set.in_context(contexts) {
            tracing::debug!(id = %set.id, "change set outside context");
            report.skipped.push(set.id.clone());
            continue;
        }
        let checksum = set.checksum();
        if let Some(recorded) = applied.get(&(set.id.clone(), set.author.clone())) {
            if *recorded != checksum {
                return Err(MigrationError::ChecksumMismatch {
                    id: set.id.clone(),
                    expected: recorded.clone(),
                    actual: checksum,
                });
            }
            report.skipped.push(set.id.clone());
            continue;
        }

        let failed = |source| MigrationError::Apply {
            id: set.id.clone(),
            source,
        };
        let mut tx = conn.begin().await.map_err(failed)?;
        for change in set.changes.iter().filter(|c| c.runs_on(dialect)) {
            tracing::debug!(id = %set.id, sql = %change.sql, "migrate");
            sqlx::query(&change.sql).execute(&mut *tx).await.map_err(failed)?;
        }
        let record = format!(
            "INSERT INTO {} (id, author, checksum, applied_at) VALUES ({}, {}, {}, {})",
            TRACKING_TABLE,
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3),
            dialect.placeholder(4)
        );
        sqlx::query(&record)
            .bind(set.id.clone())
            .bind(set.author.clone())
            .bind(checksum)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;
        tracing::info!(id = %set.id, author = %set.author, "change set applied");
        report.applied.push(set.id.clone());
    }
    Ok(report)
}
