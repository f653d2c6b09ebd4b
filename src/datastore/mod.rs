//! Data stores: the capability trait every backend implements, request/outcome types,
//! and the ordered chain the HTTP layer routes through.

mod aggregation;
mod chain;
mod config_store;
mod metadata;
mod persistence;
mod query;
mod search;

pub use aggregation::AggregationStore;
pub use chain::DataStoreChain;
pub use config_store::{ConfigStore, CONFIG_MODEL};
pub use metadata::{MetadataStore, TABLE_MODEL};
pub use persistence::PersistenceStore;
pub use query::{FieldFilter, ListQuery, SortKey};
pub use search::SearchStore;

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Store-neutral record: model name, id, attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Resource {
            kind: kind.into(),
            id: id.into(),
            attributes,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ReadRequest {
    Collection { model: String, query: ListQuery },
    Single { model: String, id: String },
}

impl ReadRequest {
    pub fn model(&self) -> &str {
        match self {
            ReadRequest::Collection { model, .. } | ReadRequest::Single { model, .. } => model,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ReadOutcome {
    Many(Vec<Resource>),
    One(Option<Resource>),
}

impl ReadOutcome {
    pub fn into_many(self) -> Vec<Resource> {
        match self {
            ReadOutcome::Many(v) => v,
            ReadOutcome::One(r) => r.into_iter().collect(),
        }
    }

    pub fn into_one(self) -> Option<Resource> {
        match self {
            ReadOutcome::One(r) => r,
            ReadOutcome::Many(v) => v.into_iter().next(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum WriteRequest {
    Create { model: String, attributes: Map<String, Value> },
    Update { model: String, id: String, attributes: Map<String, Value> },
    Delete { model: String, id: String },
}

impl WriteRequest {
    pub fn model(&self) -> &str {
        match self {
            WriteRequest::Create { model, .. }
            | WriteRequest::Update { model, .. }
            | WriteRequest::Delete { model, .. } => model,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WriteOutcome {
    Created(Resource),
    Updated(Option<Resource>),
    /// The deleted record, if it existed.
    Deleted(Option<Resource>),
}

/// One backend in the chain. A store claims models with `serves`; the chain hands it
/// only requests for those models.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn serves(&self, model: &str) -> bool;

    async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError>;

    async fn apply_on_write(&self, request: WriteRequest) -> Result<WriteOutcome, AppError> {
        Err(AppError::ReadOnly(request.model().to_string()))
    }
}
