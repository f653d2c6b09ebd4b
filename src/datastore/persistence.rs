//! Relational store for profiles. One transaction per write.

use super::{
    DataStore, FieldFilter, ListQuery, ReadOutcome, ReadRequest, WriteOutcome, WriteRequest,
};
use crate::entity::{self, FieldKind, Profile, ProfileAttributes, PROFILE_COLUMNS, PROFILE_MODEL, PROFILE_TABLE};
use crate::error::AppError;
use crate::search::ProfileSource;
use crate::sql::{self, bind_all, BindValue, Predicate, QueryBuf, SqlDialect, TableRef};
use async_trait::async_trait;
use sqlx::AnyPool;
use uuid::Uuid;

const PROFILE_TABLE_REF: TableRef<'static> = TableRef {
    name: PROFILE_TABLE,
    key: "id",
    columns: PROFILE_COLUMNS,
};

pub struct PersistenceStore {
    pool: AnyPool,
    dialect: SqlDialect,
    batch_fetch_size: usize,
}

impl PersistenceStore {
    pub fn new(pool: AnyPool, dialect: SqlDialect, batch_fetch_size: usize) -> Self {
        PersistenceStore {
            pool,
            dialect,
            batch_fetch_size: batch_fetch_size.max(1),
        }
    }

    pub async fn find(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let Some(id) = normalize_id(id) else {
            return Ok(None);
        };
        let q = sql::select_by_id(self.dialect, &PROFILE_TABLE_REF, &id);
        let mut rows = self.fetch(&q).await?;
        Ok(rows.pop())
    }

    /// Load profiles by id, `batch_fetch_size` ids per query, returned in the order of `ids`.
    /// Ids with no row are skipped.
    pub async fn find_many(&self, ids: &[String]) -> Result<Vec<Profile>, AppError> {
        let mut found = std::collections::HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_fetch_size) {
            let q = sql::select_by_ids(self.dialect, &PROFILE_TABLE_REF, chunk);
            for p in self.fetch(&q).await? {
                found.insert(p.id.to_string(), p);
            }
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Profile>, AppError> {
        self.list_where(Vec::new(), query).await
    }

    /// `query` applied to the rows whose id is in `ids` only.
    pub async fn list_within(&self, ids: &[String], query: &ListQuery) -> Result<Vec<Profile>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let within = Predicate::In {
            column: "id".into(),
            values: ids.iter().cloned().map(BindValue::Text).collect(),
        };
        self.list_where(vec![within], query).await
    }

    async fn list_where(&self, mut predicates: Vec<Predicate>, query: &ListQuery) -> Result<Vec<Profile>, AppError> {
        for f in &query.filters {
            predicates.push(predicate_for(f)?);
        }
        let mut order = Vec::with_capacity(query.sort.len());
        for key in &query.sort {
            let column = if key.field == "id" {
                "id"
            } else {
                entity::field(&key.field)
                    .map(|f| f.column)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown sort field '{}'", key.field)))?
            };
            order.push((column.to_string(), key.descending));
        }
        let q = sql::select_list(
            self.dialect,
            &PROFILE_TABLE_REF,
            &predicates,
            &order,
            Some(query.effective_limit()),
            Some(query.effective_offset()),
        );
        self.fetch(&q).await
    }

    /// Every profile, unpaged. Used to rebuild the search index.
    pub async fn all(&self) -> Result<Vec<Profile>, AppError> {
        let q = sql::select_list(self.dialect, &PROFILE_TABLE_REF, &[], &[], None, None);
        self.fetch(&q).await
    }

    pub async fn create(&self, attrs: ProfileAttributes) -> Result<Profile, AppError> {
        let profile = Profile::create(attrs);
        let q = sql::insert(self.dialect, &PROFILE_TABLE_REF, bind_values(&profile));
        let mut tx = self.pool.begin().await?;
        tracing::debug!(sql = %q.sql, "query (tx)");
        bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(profile)
    }

    pub async fn update(&self, id: &str, attrs: ProfileAttributes) -> Result<Option<Profile>, AppError> {
        let Some(id) = normalize_id(id) else {
            return Ok(None);
        };
        let mut tx = self.pool.begin().await?;
        let select = sql::select_by_id(self.dialect, &PROFILE_TABLE_REF, &id);
        let row = bind_all(sqlx::query(&select.sql), &select.params)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut profile = Profile::from_row(&row)?;
        profile.apply(attrs);
        let q = sql::update(self.dialect, &PROFILE_TABLE_REF, bind_values(&profile));
        tracing::debug!(sql = %q.sql, "query (tx)");
        bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(profile))
    }

    pub async fn delete(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let Some(id) = normalize_id(id) else {
            return Ok(None);
        };
        let mut tx = self.pool.begin().await?;
        let select = sql::select_by_id(self.dialect, &PROFILE_TABLE_REF, &id);
        let row = bind_all(sqlx::query(&select.sql), &select.params)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let profile = Profile::from_row(&row)?;
        let q = sql::delete(self.dialect, &PROFILE_TABLE_REF, &id);
        bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(profile))
    }

    async fn fetch(&self, q: &QueryBuf) -> Result<Vec<Profile>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| Profile::from_row(r).map_err(AppError::from))
            .collect()
    }
}

/// Canonical hyphenated form, or None when `id` is not a UUID (and so cannot exist).
fn normalize_id(id: &str) -> Option<String> {
    Uuid::parse_str(id).ok().map(|u| u.to_string())
}

fn bind_values(p: &Profile) -> Vec<BindValue> {
    let opt = |v: &Option<String>| v.clone().map(BindValue::Text).unwrap_or(BindValue::Null);
    vec![
        BindValue::Text(p.id.to_string()),
        BindValue::Text(p.name.clone()),
        BindValue::Text(p.email.clone()),
        BindValue::Int(i64::from(p.experience)),
        opt(&p.github),
        opt(&p.linked_in),
        opt(&p.stack_overflow),
    ]
}

fn predicate_for(f: &FieldFilter) -> Result<Predicate, AppError> {
    let def = entity::field(&f.field)
        .ok_or_else(|| AppError::BadRequest(format!("unknown filter field '{}'", f.field)))?;
    Ok(match def.kind {
        FieldKind::Text if !def.searchable => Predicate::Eq {
            column: def.column.to_string(),
            value: BindValue::Text(f.value.clone()),
        },
        FieldKind::Text => Predicate::ContainsCi {
            column: def.column.to_string(),
            value: f.value.clone(),
        },
        FieldKind::Integer => {
            let n: i64 = f
                .value
                .parse()
                .map_err(|_| AppError::BadRequest(format!("filter[{}] must be an integer", f.field)))?;
            Predicate::Eq {
                column: def.column.to_string(),
                value: BindValue::Int(n),
            }
        }
    })
}

#[async_trait]
impl ProfileSource for PersistenceStore {
    async fn load(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError> {
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        self.find_many(&ids).await
    }
}

#[async_trait]
impl DataStore for PersistenceStore {
    fn name(&self) -> &'static str {
        "persistence"
    }

    fn serves(&self, model: &str) -> bool {
        model == PROFILE_MODEL
    }

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        match request {
            ReadRequest::Collection { query, .. } => Ok(ReadOutcome::Many(
                self.list(&query).await?.into_iter().map(Profile::into_resource).collect(),
            )),
            ReadRequest::Single { id, .. } => Ok(ReadOutcome::One(self.find(&id).await?.map(Profile::into_resource))),
        }
    }

    async fn apply_on_write(&self, request: WriteRequest) -> Result<WriteOutcome, AppError> {
        match request {
            WriteRequest::Create { attributes, .. } => {
                let attrs = ProfileAttributes::from_map(attributes)?;
                Ok(WriteOutcome::Created(self.create(attrs).await?.into_resource()))
            }
            WriteRequest::Update { id, attributes, .. } => {
                let attrs = ProfileAttributes::from_map(attributes)?;
                Ok(WriteOutcome::Updated(self.update(&id, attrs).await?.map(Profile::into_resource)))
            }
            WriteRequest::Delete { id, .. } => {
                Ok(WriteOutcome::Deleted(self.delete(&id).await?.map(Profile::into_resource)))
            }
        }
    }
}
