//! Ordered composite of data stores. The first store serving a model handles it.

use super::{DataStore, ReadOutcome, ReadRequest, WriteOutcome, WriteRequest};
use crate::error::AppError;
use crate::hooks::{HookRegistry, LifecycleEvent, Operation, RequestScope, TransactionPhase};
use std::sync::Arc;

pub struct DataStoreChain {
    stores: Vec<Arc<dyn DataStore>>,
    hooks: Arc<HookRegistry>,
}

impl DataStoreChain {
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        DataStoreChain {
            stores: Vec::new(),
            hooks,
        }
    }

    pub fn push(&mut self, store: Arc<dyn DataStore>) {
        tracing::debug!(store = store.name(), position = self.stores.len(), "data store registered");
        self.stores.push(store);
    }

    /// Store names in iteration order.
    pub fn store_names(&self) -> Vec<&'static str> {
        self.stores.iter().map(|s| s.name()).collect()
    }

    pub fn route(&self, model: &str) -> Result<&Arc<dyn DataStore>, AppError> {
        self.stores
            .iter()
            .find(|s| s.serves(model))
            .ok_or_else(|| AppError::NotFound(format!("model '{}'", model)))
    }

    pub async fn apply_on_read(&self, request: ReadRequest) -> Result<ReadOutcome, AppError> {
        let store = self.route(request.model())?;
        store.apply_on_read(request).await
    }

    /// Route the write, then publish the post-commit event for whatever changed.
    pub async fn apply_on_write(
        &self,
        request: WriteRequest,
        scope: &RequestScope,
    ) -> Result<WriteOutcome, AppError> {
        let model = request.model().to_string();
        let store = self.route(&model)?;
        let outcome = store.apply_on_write(request).await?;

        let committed = match &outcome {
            WriteOutcome::Created(r) => Some((Operation::Create, r)),
            WriteOutcome::Updated(Some(r)) => Some((Operation::Update, r)),
            WriteOutcome::Deleted(Some(r)) => Some((Operation::Delete, r)),
            WriteOutcome::Updated(None) | WriteOutcome::Deleted(None) => None,
        };
        if let Some((operation, resource)) = committed {
            let event = LifecycleEvent {
                model,
                operation,
                phase: TransactionPhase::PostCommit,
                resource: resource.clone(),
            };
            self.hooks.publish(&event, scope);
        }
        Ok(outcome)
    }
}
