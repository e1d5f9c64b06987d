//! Execution-context binding.
//!
//! The active workflow is bound to the tokio task executing on its behalf, so
//! tool calls anywhere in that task's call tree resolve to the right record
//! without threading the id through every signature. At most one workflow is
//! bound per task; concurrent workflows run on separate tasks.

use std::future::Future;
use std::sync::Arc;

use workshop_state::{
    MutationOutcome, WorkflowId, WorkflowMutation, WorkflowRecord, WorkflowStore,
};

use crate::error::{EngineError, EngineResult};

tokio::task_local! {
    static ACTIVE_WORKFLOW: WorkflowBinding;
}

/// A workflow id paired with the store that owns its record.
#[derive(Clone)]
pub struct WorkflowBinding {
    workflow_id: WorkflowId,
    store: Arc<dyn WorkflowStore>,
}

impl std::fmt::Debug for WorkflowBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowBinding")
            .field("workflow_id", &self.workflow_id)
            .finish_non_exhaustive()
    }
}

impl WorkflowBinding {
    pub fn new(workflow_id: WorkflowId, store: Arc<dyn WorkflowStore>) -> Self {
        Self { workflow_id, store }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Current copy of the bound record.
    pub fn record(&self) -> EngineResult<WorkflowRecord> {
        Ok(self.store.get(&self.workflow_id)?)
    }

    /// Apply one mutation to the bound record.
    pub fn apply(&self, mutation: WorkflowMutation) -> EngineResult<MutationOutcome> {
        Ok(self.store.apply(&self.workflow_id, mutation)?)
    }
}

/// Run `fut` with `binding` as the active workflow.
///
/// Fails with `AlreadyBound` if the calling task already has a workflow bound.
pub async fn bind<F>(binding: WorkflowBinding, fut: F) -> EngineResult<F::Output>
where
    F: Future,
{
    if let Ok(existing) = current_id() {
        return Err(EngineError::AlreadyBound(existing));
    }
    Ok(ACTIVE_WORKFLOW.scope(binding, fut).await)
}

/// Synchronous counterpart of [`bind`].
pub fn bind_sync<R>(binding: WorkflowBinding, f: impl FnOnce() -> R) -> EngineResult<R> {
    if let Ok(existing) = current_id() {
        return Err(EngineError::AlreadyBound(existing));
    }
    Ok(ACTIVE_WORKFLOW.sync_scope(binding, f))
}

/// The binding of the calling task.
pub fn current() -> EngineResult<WorkflowBinding> {
    ACTIVE_WORKFLOW
        .try_with(Clone::clone)
        .map_err(|_| EngineError::NoActiveWorkflow)
}

/// Id of the workflow bound to the calling task.
pub fn current_id() -> EngineResult<WorkflowId> {
    ACTIVE_WORKFLOW
        .try_with(|b| b.workflow_id.clone())
        .map_err(|_| EngineError::NoActiveWorkflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workshop_state::MemoryWorkflowStore;

    fn binding(id: &str) -> WorkflowBinding {
        let store: Arc<dyn WorkflowStore> = Arc::new(MemoryWorkflowStore::new());
        let id = WorkflowId::from(id);
        store
            .create(WorkflowRecord::new(id.clone(), "a kite", None, 1))
            .unwrap();
        WorkflowBinding::new(id, store)
    }

    #[test]
    fn test_current_fails_when_unbound() {
        assert!(matches!(current(), Err(EngineError::NoActiveWorkflow)));
    }

    #[test]
    fn test_bind_sync_scopes_binding() {
        let id = bind_sync(binding("WF-SYNC"), || current_id().unwrap()).unwrap();
        assert_eq!(id.as_str(), "WF-SYNC");
        assert!(current_id().is_err());
    }

    #[tokio::test]
    async fn test_nested_bind_is_rejected() {
        let outer = binding("WF-OUTER");
        let inner = binding("WF-INNER");
        let nested = bind(outer, async move { bind(inner, async {}).await })
            .await
            .unwrap();
        match nested {
            Err(EngineError::AlreadyBound(id)) => assert_eq!(id.as_str(), "WF-OUTER"),
            other => panic!("expected AlreadyBound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_tasks_keep_separate_bindings() {
        let handles: Vec<_> = ["WF-A", "WF-B", "WF-C"]
            .into_iter()
            .map(|name| {
                let b = binding(name);
                tokio::spawn(async move {
                    bind(b, async {
                        tokio::task::yield_now().await;
                        current_id().unwrap()
                    })
                    .await
                    .unwrap()
                })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().to_string());
        }
        assert_eq!(seen, vec!["WF-A", "WF-B", "WF-C"]);
    }
}
