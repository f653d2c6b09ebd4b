//! Read-only analytic models: one model per analytic table, answered with GROUP BY queries.

use super::{DataStore, ListQuery, ReadOutcome, ReadRequest, Resource};
use crate::analytics::{AnalyticModel, AnalyticTable, MeasureFunction, PhysicalCatalog};
use crate::entity::FieldKind;
use crate::error::AppError;
use crate::sql::{self, bind_all, Aggregate, BindValue, Predicate, Projection, QueryBuf, SqlDialect};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::any::AnyRow;
use sqlx::AnyPool;
use sqlx::Row;
use std::sync::Arc;

pub struct AggregationStore {
    pool: AnyPool,
    dialect: SqlDialect,
    model: Arc<AnalyticModel>,
    catalog: PhysicalCatalog,
}

impl AggregationStore {
    pub fn new(pool: AnyPool, dialect: SqlDialect, model: Arc<AnalyticModel>, catalog: PhysicalCatalog) -> Self {
        AggregationStore {
            pool,
            dialect,
            model,
            catalog,
        }
    }

    fn plan(&self, table: &AnalyticTable, query: &ListQuery) -> Result<QueryBuf, AppError> {
        let selected: Vec<&str> = match &query.fields {
            Some(fields) if fields.is_empty() => {
                return Err(AppError::BadRequest(format!("fields[{}] selects nothing", table.name)))
            }
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None => table.field_names().collect(),
        };

        let mut projections = Vec::with_capacity(selected.len());
        for name in &selected {
            if let Some(d) = table.dimension(name) {
                projections.push(Projection::Column {
                    column: d.column.clone(),
                    alias: d.name.clone(),
                });
            } else if let Some(m) = table.measure(name) {
                projections.push(Projection::Aggregate {
                    function: aggregate(m.function),
                    column: m.column.clone(),
                    alias: m.name.clone(),
                });
            } else {
                return Err(AppError::BadRequest(format!("unknown field '{}' on '{}'", name, table.name)));
            }
        }

        let mut predicates = Vec::with_capacity(query.filters.len());
        for f in &query.filters {
            let d = table.dimension(&f.field).ok_or_else(|| {
                AppError::BadRequest(format!("filter[{}]: only dimensions of '{}' can be filtered", f.field, table.name))
            })?;
            let value = match self.catalog.column(&table.table, &d.column) {
                Some(FieldKind::Integer) => BindValue::Int(
                    f.value
                        .parse()
                        .map_err(|_| AppError::BadRequest(format!("filter[{}] must be an integer", f.field)))?,
                ),
                _ => BindValue::Text(f.value.clone()),
            };
            predicates.push(Predicate::Eq {
                column: d.column.clone(),
                value,
            });
        }

        let mut order = Vec::with_capacity(query.sort.len());
        for key in &query.sort {
            if !selected.contains(&key.field.as_str()) {
                return Err(AppError::BadRequest(format!("cannot sort on unselected field '{}'", key.field)));
            }
            order.push((key.field.clone(), key.descending));
        }

        Ok(sql::select_grouped(
            self.dialect,
            &table.table,
            &projections,
            &predicates,
            &order,
            query.effective_limit(),
            query.effective_offset(),
        ))
    }

    /// Rows of `table` for `query`. Resource ids are row positions counted from the first page.
    pub async fn aggregate(&self, table: &AnalyticTable, query: &ListQuery) -> Result<Vec<Resource>, AppError> {
        let q = self.plan(table, query)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, model = %table.name, "aggregate");
        let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(&self.pool).await?;
        let offset = query.effective_offset() as usize;
        rows.iter()
            .enumerate()
            .map(|(i, row)| Ok(Resource::new(&table.name, (offset + i).to_string(), row_attributes(row)?)))
            .collect()
    }
}

fn aggregate(f: MeasureFunction) -> Aggregate {
    match f {
        MeasureFunction::Count => Aggregate::Count,
        MeasureFunction::Sum => Aggregate::Sum,
        MeasureFunction::Avg => Aggregate::Avg,
        MeasureFunction::Min => Aggregate::Min,
        MeasureFunction::Max => Aggregate::Max,
    }
}

fn row_attributes(row: &AnyRow) -> Result<Map<String, Value>, AppError> {
    let mut out = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(sqlx::Column::name(col).to_string(), cell(row, i)?);
    }
    Ok(out)
}

/// Decode one result cell as integer, float or text, whichever the driver reports.
fn cell(row: &AnyRow, i: usize) -> Result<Value, AppError> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return Ok(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return Ok(v.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return Ok(v.map(Value::Bool).unwrap_or(Value::Null));
    }
    Ok(row.try_get::<Option<String>, _>(i)?.map(Value::String).unwrap_or(Value::Null))
}

#[async_trait]
impl DataStore for AggregationStore {
    fn name(&self) -> &'static str {
        "aggregation"
    }

    fn serves(&self, model: &str) -> bool {
        self.model.table(model).is_some()
    }

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        let table = self
            .model
            .table(request.model())
            .ok_or_else(|| AppError::NotFound(format!("model '{}'", request.model())))?;
        match request {
            ReadRequest::Collection { ref query, .. } => Ok(ReadOutcome::Many(self.aggregate(table, query).await?)),
            // Positions address the default projection: every field, no filters, grouped
            // columns ascending. Ids from a filtered or sorted collection do not carry over.
            ReadRequest::Single { ref id, .. } => {
                let Ok(position) = id.parse::<u32>() else {
                    return Ok(ReadOutcome::One(None));
                };
                let query = ListQuery {
                    limit: Some(1),
                    offset: Some(position),
                    ..Default::default()
                };
                Ok(ReadOutcome::One(self.aggregate(table, &query).await?.pop()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{Dimension, Measure};
    use crate::datastore::{FieldFilter, SortKey};
    use sqlx::any::AnyPoolOptions;

    fn stats() -> AnalyticTable {
        AnalyticTable {
            name: "stats".into(),
            table: "profile".into(),
            description: None,
            dimensions: vec![Dimension { name: "years".into(), column: "experience".into() }],
            measures: vec![
                Measure { name: "headcount".into(), function: MeasureFunction::Count, column: None },
                Measure { name: "longestName".into(), function: MeasureFunction::Max, column: Some("name".into()) },
            ],
        }
    }

    fn store(table: AnalyticTable) -> AggregationStore {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        AggregationStore::new(
            pool,
            SqlDialect::Embedded,
            Arc::new(AnalyticModel::new(vec![table])),
            PhysicalCatalog::profiles(),
        )
    }

    #[tokio::test]
    async fn plans_selected_fields_with_typed_filters() {
        let s = store(stats());
        let query = ListQuery {
            filters: vec![FieldFilter { field: "years".into(), value: "4".into() }],
            sort: vec![SortKey { field: "headcount".into(), descending: true }],
            fields: Some(vec!["years".into(), "headcount".into()]),
            ..Default::default()
        };
        let q = s.plan(&stats(), &query).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"experience\" AS \"years\", COUNT(*) AS \"headcount\" FROM \"profile\" \
             WHERE \"experience\" = ?1 GROUP BY \"experience\" ORDER BY \"headcount\" DESC LIMIT 100 OFFSET 0"
        );
        assert_eq!(q.params, vec![BindValue::Int(4)]);
    }

    #[tokio::test]
    async fn rejects_unknown_fields_and_measure_filters() {
        let s = store(stats());
        let unknown = ListQuery { fields: Some(vec!["salary".into()]), ..Default::default() };
        assert!(matches!(s.plan(&stats(), &unknown), Err(AppError::BadRequest(_))));

        let measure_filter = ListQuery {
            filters: vec![FieldFilter { field: "headcount".into(), value: "1".into() }],
            ..Default::default()
        };
        assert!(matches!(s.plan(&stats(), &measure_filter), Err(AppError::BadRequest(_))));

        let unselected_sort = ListQuery {
            fields: Some(vec!["headcount".into()]),
            sort: vec![SortKey { field: "years".into(), descending: false }],
            ..Default::default()
        };
        assert!(matches!(s.plan(&stats(), &unselected_sort), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn serves_only_configured_tables() {
        let s = store(stats());
        assert!(s.serves("stats"));
        assert!(!s.serves("profiles"));
    }
}
