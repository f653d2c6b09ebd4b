//! Read-only `table` model describing the configured analytic tables.

use super::{DataStore, ReadOutcome, ReadRequest, Resource};
use crate::analytics::{AnalyticModel, AnalyticTable};
use crate::error::AppError;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const TABLE_MODEL: &str = "table";

pub struct MetadataStore {
    model: Arc<AnalyticModel>,
    dialect: SqlDialect,
}

impl MetadataStore {
    pub fn new(model: Arc<AnalyticModel>, dialect: SqlDialect) -> Self {
        MetadataStore { model, dialect }
    }

    fn describe(&self, table: &AnalyticTable) -> Result<Resource, AppError> {
        let value = serde_json::to_value(table).map_err(|e| AppError::Validation(e.to_string()))?;
        let Value::Object(mut attributes) = value else {
            return Err(AppError::Validation(format!("table '{}' is not an object", table.name)));
        };
        attributes.remove("name");
        attributes.insert("dialect".into(), Value::String(self.dialect.dialect_type().into()));
        Ok(Resource::new(TABLE_MODEL, &table.name, attributes))
    }
}

#[async_trait]
impl DataStore for MetadataStore {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn serves(&self, model: &str) -> bool {
        model == TABLE_MODEL
    }

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        match request {
            ReadRequest::Collection { query, .. } => {
                let offset = query.effective_offset() as usize;
                let limit = query.effective_limit() as usize;
                let resources = self
                    .model
                    .tables()
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|t| self.describe(t))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ReadOutcome::Many(resources))
            }
            ReadRequest::Single { id, .. } => Ok(ReadOutcome::One(
                self.model.table(&id).map(|t| self.describe(t)).transpose()?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{Dimension, Measure, MeasureFunction};
    use crate::datastore::ListQuery;

    fn store() -> MetadataStore {
        let table = AnalyticTable {
            name: "stats".into(),
            table: "profile".into(),
            description: Some("Profiles by experience".into()),
            dimensions: vec![Dimension { name: "experience".into(), column: "experience".into() }],
            measures: vec![Measure { name: "headcount".into(), function: MeasureFunction::Count, column: None }],
        };
        MetadataStore::new(Arc::new(AnalyticModel::new(vec![table])), SqlDialect::Postgres)
    }

    #[tokio::test]
    async fn describes_tables_with_dialect() {
        let out = store()
            .apply_on_read(ReadRequest::Single { model: TABLE_MODEL.into(), id: "stats".into() })
            .await
            .unwrap();
        let ReadOutcome::One(Some(r)) = out else { panic!("expected one resource") };
        assert_eq!(r.id, "stats");
        assert_eq!(r.attributes["dialect"], "postgres");
        assert_eq!(r.attributes["table"], "profile");
        assert_eq!(r.attributes["measures"][0]["function"], "count");
    }

    #[tokio::test]
    async fn lists_and_misses() {
        let s = store();
        let many = s
            .apply_on_read(ReadRequest::Collection { model: TABLE_MODEL.into(), query: ListQuery::default() })
            .await
            .unwrap();
        assert!(matches!(many, ReadOutcome::Many(ref v) if v.len() == 1));
        let none = s
            .apply_on_read(ReadRequest::Single { model: TABLE_MODEL.into(), id: "nope".into() })
            .await
            .unwrap();
        assert!(matches!(none, ReadOutcome::One(None)));
    }
}
