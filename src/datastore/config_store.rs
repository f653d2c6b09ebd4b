//! `config` model: create, read, update and delete analytic table config files.
//! Content is validated together with the other files before anything is written.
//! Changes apply to the aggregation and metadata models on the next start.

use super::{DataStore, ReadOutcome, ReadRequest, Resource, WriteOutcome, WriteRequest};
use crate::analytics::{self, PhysicalCatalog, TableConfigFile, TABLES_DIR};
use crate::error::AppError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;

pub const CONFIG_MODEL: &str = "config";

const STEM: &str = r"^[A-Za-z][A-Za-z0-9_-]*$";
const CONFIG_TYPE: &str = "TABLE";

pub struct ConfigStore {
    root: PathBuf,
    catalog: PhysicalCatalog,
    writes: Mutex<()>,
}

struct ConfigAttributes {
    path: Option<String>,
    content: Option<String>,
}

impl ConfigStore {
    pub fn new(root: PathBuf, catalog: PhysicalCatalog) -> Self {
        ConfigStore {
            root,
            catalog,
            writes: Mutex::new(()),
        }
    }

    fn stem_regex() -> Result<Regex, AppError> {
        Regex::new(STEM).map_err(|e| AppError::Validation(e.to_string()))
    }

    /// Config id for a relative path like `models/tables/stats.json`.
    fn stem_from_path(path: &str) -> Result<String, AppError> {
        let stem = path
            .strip_prefix(TABLES_DIR)
            .and_then(|p| p.strip_prefix('/'))
            .and_then(|p| p.strip_suffix(".json"))
            .ok_or_else(|| AppError::BadRequest(format!("path must look like {}/<name>.json", TABLES_DIR)))?;
        if !Self::stem_regex()?.is_match(stem) {
            return Err(AppError::BadRequest(format!("invalid config name '{}'", stem)));
        }
        Ok(stem.to_string())
    }

    fn resource(stem: &str, content: String) -> Resource {
        let mut attributes = Map::new();
        attributes.insert("path".into(), Value::String(format!("{}/{}.json", TABLES_DIR, stem)));
        attributes.insert("type".into(), Value::String(CONFIG_TYPE.into()));
        attributes.insert("content".into(), Value::String(content));
        Resource::new(CONFIG_MODEL, stem, attributes)
    }

    fn parse_attributes(attributes: Map<String, Value>) -> Result<ConfigAttributes, AppError> {
        let mut out = ConfigAttributes {
            path: None,
            content: None,
        };
        for (key, value) in attributes {
            match (key.as_str(), value) {
                ("path", Value::String(s)) => out.path = Some(s),
                ("content", Value::String(s)) => out.content = Some(s),
                ("type", Value::String(s)) if s == CONFIG_TYPE => {}
                ("path" | "content" | "type", v) => {
                    return Err(AppError::BadRequest(format!("invalid value for '{}': {}", key, v)))
                }
                (other, _) => return Err(AppError::BadRequest(format!("unknown attribute '{}'", other))),
            }
        }
        Ok(out)
    }

    async fn read(&self, stem: &str) -> Result<Option<String>, AppError> {
        if !Self::stem_regex()?.is_match(stem) {
            return Ok(None);
        }
        match tokio::fs::read_to_string(analytics::config_path(&self.root, stem)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate `content` as the new body of `stem` alongside every other file.
    async fn check(&self, stem: &str, content: &str) -> Result<(), AppError> {
        let invalid = |e: crate::error::ConfigError| AppError::Validation(e.to_string());
        let candidate = analytics::parse(content, stem).map_err(invalid)?;
        let mut files: Vec<TableConfigFile> = analytics::load_files(&self.root)
            .await
            .map_err(invalid)?
            .into_iter()
            .filter(|(s, _)| s != stem)
            .map(|(_, f)| f)
            .collect();
        files.push(candidate);
        analytics::validate(files.iter(), &self.catalog).map_err(invalid)
    }

    async fn write(&self, stem: &str, content: &str) -> Result<(), AppError> {
        tokio::fs::create_dir_all(self.root.join(TABLES_DIR)).await?;
        tokio::fs::write(analytics::config_path(&self.root, stem), content).await?;
        tracing::info!(config = %stem, "analytic config written");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Resource>, AppError> {
        let mut out = Vec::new();
        let files = analytics::load_files(&self.root)
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        for (stem, _) in files {
            if let Some(content) = self.read(&stem).await? {
                out.push(Self::resource(&stem, content));
            }
        }
        Ok(out)
    }

    pub async fn create(&self, attributes: Map<String, Value>) -> Result<Resource, AppError> {
        let attrs = Self::parse_attributes(attributes)?;
        let path = attrs.path.ok_or_else(|| AppError::BadRequest("path is required".into()))?;
        let content = attrs.content.ok_or_else(|| AppError::BadRequest("content is required".into()))?;
        let stem = Self::stem_from_path(&path)?;
        let _guard = self.writes.lock().await;
        if self.read(&stem).await?.is_some() {
            return Err(AppError::Conflict(format!("config '{}' already exists", stem)));
        }
        self.check(&stem, &content).await?;
        self.write(&stem, &content).await?;
        Ok(Self::resource(&stem, content))
    }

    pub async fn update(&self, stem: &str, attributes: Map<String, Value>) -> Result<Option<Resource>, AppError> {
        let attrs = Self::parse_attributes(attributes)?;
        if let Some(path) = attrs.path {
            if Self::stem_from_path(&path)? != stem {
                return Err(AppError::BadRequest("path cannot be changed".into()));
            }
        }
        let content = attrs.content.ok_or_else(|| AppError::BadRequest("content is required".into()))?;
        let _guard = self.writes.lock().await;
        if self.read(stem).await?.is_none() {
            return Ok(None);
        }
        self.check(stem, &content).await?;
        self.write(stem, &content).await?;
        Ok(Some(Self::resource(stem, content)))
    }

    pub async fn delete(&self, stem: &str) -> Result<Option<Resource>, AppError> {
        let _guard = self.writes.lock().await;
        let Some(content) = self.read(stem).await? else {
            return Ok(None);
        };
        tokio::fs::remove_file(analytics::config_path(&self.root, stem)).await?;
        tracing::info!(config = %stem, "analytic config deleted");
        Ok(Some(Self::resource(stem, content)))
    }
}

#[async_trait]
impl DataStore for ConfigStore {
    fn name(&self) -> &'static str {
        "config"
    }

    fn serves(&self, model: &str) -> bool {
        model == CONFIG_MODEL
    }

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        match request {
            ReadRequest::Collection { query, .. } => {
                let all = self.list().await?;
                Ok(ReadOutcome::Many(
                    all.into_iter()
                        .skip(query.effective_offset() as usize)
                        .take(query.effective_limit() as usize)
                        .collect(),
                ))
            }
            ReadRequest::Single { id, .. } => {
                Ok(ReadOutcome::One(self.read(&id).await?.map(|c| Self::resource(&id, c))))
            }
        }
    }

    async fn apply_on_write(&self, request: WriteRequest) -> Result<WriteOutcome, AppError> {
        match request {
            WriteRequest::Create { attributes, .. } => Ok(WriteOutcome::Created(self.create(attributes).await?)),
            WriteRequest::Update { id, attributes, .. } => Ok(WriteOutcome::Updated(self.update(&id, attributes).await?)),
            WriteRequest::Delete { id, .. } => Ok(WriteOutcome::Deleted(self.delete(&id).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VALID: &str = r#"{"tables":[{"name":"byYears","table":"profile",
        "dimensions":[{"name":"years","column":"experience"}],
        "measures":[{"name":"headcount","function":"count"}]}]}"#;

    fn attrs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf(), PhysicalCatalog::profiles());

        let created = store
            .create(attrs(json!({"path": "models/tables/years.json", "type": "TABLE", "content": VALID})))
            .await
            .unwrap();
        assert_eq!(created.id, "years");
        assert!(dir.path().join("models/tables/years.json").exists());
        assert_eq!(store.list().await.unwrap().len(), 1);

        let renamed = VALID.replace("byYears", "byExperience");
        let updated = store.update("years", attrs(json!({"content": renamed}))).await.unwrap().unwrap();
        assert!(updated.attributes["content"].as_str().unwrap().contains("byExperience"));

        assert!(store.delete("years").await.unwrap().is_some());
        assert!(store.delete("years").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_content_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf(), PhysicalCatalog::profiles());

        let bad_column = VALID.replace("\"column\":\"experience\"", "\"column\":\"salary\"");
        let err = store
            .create(attrs(json!({"path": "models/tables/x.json", "content": bad_column})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!dir.path().join("models/tables/x.json").exists());

        let err = store
            .create(attrs(json!({"path": "models/tables/../../etc.json", "content": VALID})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert!(store.read("../secrets").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_names_across_files_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf(), PhysicalCatalog::profiles());
        store
            .create(attrs(json!({"path": "models/tables/a.json", "content": VALID})))
            .await
            .unwrap();

        let err = store
            .create(attrs(json!({"path": "models/tables/b.json", "content": VALID})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = store
            .create(attrs(json!({"path": "models/tables/a.json", "content": VALID})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
