//! Search-backed store in front of persistence. Every `name`/`email` filter is answered from
//! the index and rechecked against the loaded rows; reads without text filters go to the index
//! when it can serve them, otherwise to the wrapped persistence store. Writes always go to
//! persistence and then queue the touched id for reindexing.

use super::{DataStore, FieldFilter, ListQuery, PersistenceStore, ReadOutcome, ReadRequest, WriteOutcome, WriteRequest};
use crate::entity::{self, Profile, ProfileAttributes, PROFILE_MODEL};
use crate::error::AppError;
use crate::search::{IndexQuery, IndexSort, IndexSynchronizer, ProfileIndex, SearchSettings, TermField};
use async_trait::async_trait;
use std::sync::Arc;

pub struct SearchStore {
    inner: Arc<PersistenceStore>,
    index: Arc<ProfileIndex>,
    sync: IndexSynchronizer,
    settings: SearchSettings,
}

/// A `name`/`email` substring filter. `needle` is lowercased.
#[derive(Clone, Debug, PartialEq)]
struct TextFilter {
    field: TermField,
    value: String,
    needle: String,
}

impl TextFilter {
    fn matches(&self, p: &Profile) -> bool {
        let haystack = match self.field {
            TermField::Name => &p.name,
            TermField::Email => &p.email,
        };
        haystack.to_lowercase().contains(&self.needle)
    }
}

#[derive(Debug, PartialEq)]
enum Plan {
    /// Persistence answers the whole query.
    Persistence,
    /// The index finds and orders every candidate; text filters are rechecked, then paged.
    Index {
        query: IndexQuery,
        text: Vec<TextFilter>,
        limit: usize,
        offset: usize,
    },
    /// The index narrows text matches to a set of ids; persistence applies the rest.
    Narrowed {
        query: IndexQuery,
        text: Vec<TextFilter>,
        rest: ListQuery,
    },
}

impl SearchStore {
    /// Open the index and start its refresh task. Must run inside a tokio runtime.
    pub async fn open(inner: Arc<PersistenceStore>, settings: SearchSettings) -> Result<Self, AppError> {
        let index = Arc::new(ProfileIndex::open(&settings)?);
        let sync = IndexSynchronizer::spawn(index.clone(), inner.clone(), settings.refresh_interval);
        let store = SearchStore {
            inner,
            index,
            sync,
            settings,
        };
        if store.settings.index_on_startup {
            let n = store.reindex().await?;
            tracing::info!(rows = n, documents = store.index.num_docs(), "search index built");
        }
        Ok(store)
    }

    /// Queue every persisted profile for indexing and wait until they are searchable.
    pub async fn reindex(&self) -> Result<usize, AppError> {
        let all = self.inner.all().await?;
        for p in &all {
            self.sync.submit(p.id);
        }
        self.sync.flush().await;
        Ok(all.len())
    }

    /// Wait for queued index updates to become visible.
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Index terms for one text filter: the value itself when it fits in one gram, otherwise
    /// every gram-sized window of it.
    fn grams(&self, value: &str) -> Vec<String> {
        let chars: Vec<char> = value.chars().collect();
        let width = self.settings.max_gram;
        if chars.len() <= width {
            return vec![value.to_string()];
        }
        let mut out: Vec<String> = chars.windows(width).map(|w| w.iter().collect()).collect();
        out.sort();
        out.dedup();
        out
    }

    fn plan(&self, query: &ListQuery) -> Result<Plan, AppError> {
        let mut text = Vec::new();
        let mut rest: Vec<&FieldFilter> = Vec::new();
        for filter in &query.filters {
            let field = match filter.field.as_str() {
                "name" => TermField::Name,
                "email" => TermField::Email,
                _ => {
                    rest.push(filter);
                    continue;
                }
            };
            if filter.value.chars().count() < self.settings.min_gram {
                return Err(AppError::BadRequest(format!(
                    "filter[{}] needs at least {} characters",
                    filter.field, self.settings.min_gram
                )));
            }
            text.push(TextFilter {
                field,
                value: filter.value.clone(),
                needle: filter.value.to_lowercase(),
            });
        }
        if text.is_empty() && rest.is_empty() {
            return Ok(Plan::Persistence);
        }

        let mut query_terms = IndexQuery {
            limit: usize::MAX,
            ..Default::default()
        };
        for t in &text {
            for gram in self.grams(&t.value) {
                query_terms.terms.push((t.field, gram));
            }
        }

        match self.index_only(query, &rest, query_terms.clone())? {
            Some(served) => Ok(Plan::Index {
                query: served,
                text,
                limit: query.effective_limit() as usize,
                offset: query.effective_offset() as usize,
            }),
            None if text.is_empty() => Ok(Plan::Persistence),
            None => Ok(Plan::Narrowed {
                query: query_terms,
                text,
                rest: ListQuery {
                    filters: rest.into_iter().cloned().collect(),
                    ..query.clone()
                },
            }),
        }
    }

    /// `base` extended with the non-text filters and the sort, or `None` when the index
    /// cannot express them.
    fn index_only(&self, query: &ListQuery, rest: &[&FieldFilter], mut base: IndexQuery) -> Result<Option<IndexQuery>, AppError> {
        for filter in rest {
            if entity::field(&filter.field).is_none() {
                return Err(AppError::BadRequest(format!("unknown filter field '{}'", filter.field)));
            }
            match (filter.field.as_str(), filter.value.parse::<i64>()) {
                ("experience", Ok(n)) if base.experience.is_none() => base.experience = Some(n),
                _ => return Ok(None),
            }
        }
        for key in &query.sort {
            let sort = match key.field.as_str() {
                "id" => IndexSort::Id,
                "name" => IndexSort::Name,
                "experience" => IndexSort::Experience,
                _ => return Ok(None),
            };
            base.sort.push((sort, key.descending));
        }
        Ok(Some(base))
    }

    /// Rows for every index hit of `query` that really contains each text filter, in index order.
    async fn candidates(&self, query: &IndexQuery, text: &[TextFilter]) -> Result<Vec<Profile>, AppError> {
        let hits = self.index.search(query)?;
        let mut rows = self.inner.find_many(&hits.ids).await?;
        rows.retain(|p| text.iter().all(|t| t.matches(p)));
        tracing::debug!(hits = hits.total, matched = rows.len(), "search index candidates");
        Ok(rows)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Profile>, AppError> {
        match self.plan(query)? {
            Plan::Persistence => self.inner.list(query).await,
            Plan::Index {
                mut query,
                text,
                limit,
                offset,
            } => {
                if text.is_empty() {
                    query.limit = limit;
                    query.offset = offset;
                    return self.inner.find_many(&self.index.search(&query)?.ids).await;
                }
                let rows = self.candidates(&query, &text).await?;
                Ok(rows.into_iter().skip(offset).take(limit).collect())
            }
            Plan::Narrowed { query, text, rest } => {
                let ids: Vec<String> = self
                    .candidates(&query, &text)
                    .await?
                    .iter()
                    .map(|p| p.id.to_string())
                    .collect();
                self.inner.list_within(&ids, &rest).await
            }
        }
    }
}

#[async_trait]
impl DataStore for SearchStore {
    fn name(&self) -> &'static str {
        "search"
    }

    fn serves(&self, model: &str) -> bool {
        model == PROFILE_MODEL
    }

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        match request {
            ReadRequest::Collection { query, .. } => Ok(ReadOutcome::Many(
                self.list(&query).await?.into_iter().map(Profile::into_resource).collect(),
            )),
            ReadRequest::Single { id, .. } => {
                Ok(ReadOutcome::One(self.inner.find(&id).await?.map(Profile::into_resource)))
            }
        }
    }

    async fn apply_on_write(&self, request: WriteRequest) -> Result<WriteOutcome, AppError> {
        match request {
            WriteRequest::Create { attributes, .. } => {
                let profile = self.inner.create(ProfileAttributes::from_map(attributes)?).await?;
                self.sync.submit(profile.id);
                Ok(WriteOutcome::Created(profile.into_resource()))
            }
            WriteRequest::Update { id, attributes, .. } => {
                let attrs = ProfileAttributes::from_map(attributes)?;
                let updated = self.inner.update(&id, attrs).await?;
                if let Some(p) = &updated {
                    self.sync.submit(p.id);
                }
                Ok(WriteOutcome::Updated(updated.map(Profile::into_resource)))
            }
            WriteRequest::Delete { id, .. } => {
                let deleted = self.inner.delete(&id).await?;
                if let Some(p) = &deleted {
                    self.sync.submit(p.id);
                }
                Ok(WriteOutcome::Deleted(deleted.map(Profile::into_resource)))
            }
        }
    }
}
