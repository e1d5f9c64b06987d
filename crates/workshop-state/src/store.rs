//! Record store abstraction.
//!
//! Guarantees every implementation must uphold:
//! - at most one record per [`WorkflowId`];
//! - `apply` is atomic: a mutation is either fully applied or rejected;
//! - only finished records may be evicted: terminal ones, or ones whose
//!   execution was marked ended with `close`.
//!
//! The store is synchronous: tool calls run inline on the workflow's task and
//! hold the lock only for the duration of one mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::mutation::{MutationOutcome, WorkflowMutation};
use crate::record::WorkflowRecord;
use crate::retention::RetentionPolicy;

/// Result type for store operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Unique identifier of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// `WF-<yyyymmdd>-<uuid v4 as 32 upper-case hex chars>`.
    pub fn generate() -> Self {
        let date = Utc::now().format("%Y%m%d");
        let suffix = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        WorkflowId(format!("WF-{date}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        WorkflowId(s.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        WorkflowId(s)
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a retention pass.
#[derive(Debug, Clone, Default)]
pub struct EvictionReport {
    pub evicted: Vec<WorkflowRecord>,
    pub remaining_count: usize,
}

impl EvictionReport {
    pub fn removed_ids(&self) -> Vec<WorkflowId> {
        self.evicted.iter().map(|r| r.workflow_id.clone()).collect()
    }
}

/// Keyed storage for one record per workflow instance.
pub trait WorkflowStore: Send + Sync {
    /// Register a new record. Fails with `AlreadyExists` on id collision.
    fn create(&self, record: WorkflowRecord) -> StateResult<()>;

    /// Clone of the current record. Fails with `NotFound` if absent.
    fn get(&self, id: &WorkflowId) -> StateResult<WorkflowRecord>;

    /// Apply one mutation atomically.
    fn apply(&self, id: &WorkflowId, mutation: WorkflowMutation) -> StateResult<MutationOutcome>;

    /// Mark that execution of `id` has ended. The record keeps its status
    /// but becomes eligible for eviction and retention. Idempotent.
    fn close(&self, id: &WorkflowId) -> StateResult<()>;

    /// Remove a finished record and hand it back. Fails with `StillActive`
    /// for records that are neither terminal nor closed.
    fn evict(&self, id: &WorkflowId) -> StateResult<WorkflowRecord>;

    /// All registered ids, sorted.
    fn ids(&self) -> StateResult<Vec<WorkflowId>>;

    /// Number of registered records.
    fn len(&self) -> StateResult<usize>;

    fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Evict finished records according to `policy`, evaluated at `now`.
    fn compact(&self, policy: &RetentionPolicy, now: DateTime<Utc>)
        -> StateResult<EvictionReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_have_expected_shape_and_differ() {
        let a = WorkflowId::generate();
        let b = WorkflowId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("WF-"));
        let parts: Vec<&str> = a.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 32);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_workflow_id_serializes_as_plain_string() {
        let id = WorkflowId::from("WF-20250101-ABC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"WF-20250101-ABC\"");
    }
}
