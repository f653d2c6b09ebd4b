//! Lifecycle hooks: observers bound to (model, operation, phase), published after commit.

mod save_profile;

pub use save_profile::SaveProfileHook;

use crate::datastore::Resource;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Transaction phase an observer is bound to. Events are only published once the
/// store's transaction has committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionPhase {
    PostCommit,
}

#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    pub model: String,
    pub operation: Operation,
    pub phase: TransactionPhase,
    pub resource: Resource,
}

/// Per-request context handed to observers.
#[derive(Clone, Debug)]
pub struct RequestScope {
    pub request_id: Uuid,
    pub path: String,
}

impl RequestScope {
    pub fn new(path: impl Into<String>) -> Self {
        RequestScope {
            request_id: Uuid::new_v4(),
            path: path.into(),
        }
    }
}

#[derive(Error, Debug)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// Side-effect-only observer. Must not block; the entity it sees is already committed.
pub trait LifecycleHook: Send + Sync {
    fn execute(&self, event: &LifecycleEvent, scope: &RequestScope) -> Result<(), HookError>;
}

struct Binding {
    model: String,
    operation: Operation,
    phase: TransactionPhase,
    hook: Arc<dyn LifecycleHook>,
}

#[derive(Default)]
pub struct HookRegistry {
    bindings: Vec<Binding>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        model: impl Into<String>,
        operation: Operation,
        phase: TransactionPhase,
        hook: Arc<dyn LifecycleHook>,
    ) {
        self.bindings.push(Binding {
            model: model.into(),
            operation,
            phase,
            hook,
        });
    }

    /// Deliver `event` to every matching observer. Each observer runs isolated: an error or a
    /// panic is logged and the remaining observers still run. Returns how many completed.
    pub fn publish(&self, event: &LifecycleEvent, scope: &RequestScope) -> usize {
        let mut delivered = 0;
        for b in self
            .bindings
            .iter()
            .filter(|b| b.model == event.model && b.operation == event.operation && b.phase == event.phase)
        {
            match catch_unwind(AssertUnwindSafe(|| b.hook.execute(event, scope))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(model = %event.model, operation = ?event.operation, error = %e, "lifecycle hook failed");
                }
                Err(_) => {
                    tracing::error!(model = %event.model, operation = ?event.operation, "lifecycle hook panicked");
                }
            }
        }
        delivered
    }
}
