//! Read table config files from `<dynamic_config_path>/models/tables`.

use super::{validate, AnalyticModel, PhysicalCatalog, TableConfigFile};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

pub const TABLES_DIR: &str = "models/tables";

/// Path of the config file named `stem` under `root`.
pub fn config_path(root: &Path, stem: &str) -> PathBuf {
    root.join(TABLES_DIR).join(format!("{}.json", stem))
}

pub fn parse(content: &str, origin: &str) -> Result<TableConfigFile, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::Load(format!("{}: {}", origin, e)))
}

/// All `*.json` files under the tables directory, sorted by file stem. A missing directory
/// holds no tables.
pub async fn load_files(root: &Path) -> Result<Vec<(String, TableConfigFile)>, ConfigError> {
    let dir = root.join(TABLES_DIR);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", dir.display(), e))),
    };
    let mut files = Vec::new();
    loop {
        let entry = entries
            .next_entry()
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
        let Some(entry) = entry else { break };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        files.push((stem, parse(&content, &path.display().to_string())?));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Load and validate every table config.
pub async fn load_model(root: &Path, catalog: &PhysicalCatalog) -> Result<AnalyticModel, ConfigError> {
    let files = load_files(root).await?;
    validate(files.iter().map(|(_, f)| f), catalog)?;
    let tables: Vec<_> = files.into_iter().flat_map(|(_, f)| f.tables).collect();
    tracing::info!(tables = tables.len(), path = %root.display(), "analytic model loaded");
    Ok(AnalyticModel::new(tables))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = r#"{"tables":[{"name":"stats","table":"profile",
        "dimensions":[{"name":"experience","column":"experience"}],
        "measures":[{"name":"headcount","function":"count"}]}]}"#;

    #[tokio::test]
    async fn loads_json_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let tables = dir.path().join(TABLES_DIR);
        std::fs::create_dir_all(&tables).unwrap();
        std::fs::write(tables.join("b.json"), STATS.replace("stats", "later")).unwrap();
        std::fs::write(tables.join("a.json"), STATS).unwrap();
        std::fs::write(tables.join("notes.txt"), "ignored").unwrap();

        let model = load_model(dir.path(), &PhysicalCatalog::profiles()).await.unwrap();
        let names: Vec<_> = model.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["stats", "later"]);
        assert!(model.table("later").unwrap().measure("headcount").is_some());
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let model = load_model(dir.path(), &PhysicalCatalog::profiles()).await.unwrap();
        assert!(model.tables().is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse(r#"{"tables":[],"extra":1}"#, "x.json").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
