//! Error types for workshop-state

use thiserror::Error;

use crate::status::WorkflowStatus;
use crate::store::WorkflowId;

/// Errors raised by the record model and the record stores.
#[derive(Error, Debug)]
pub enum StateError {
    /// No record is registered under the id.
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),

    /// A record with this id is already registered.
    #[error("workflow already exists: {0}")]
    AlreadyExists(WorkflowId),

    /// Eviction was requested for a record that has not reached a terminal status.
    #[error("workflow {id} is still active (status: {status})")]
    StillActive {
        id: WorkflowId,
        status: WorkflowStatus,
    },

    /// The state machine does not permit this status change.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    /// Another rework cycle was requested after the limit was reached.
    #[error("rework limit exceeded: {limit} cycle(s) already used")]
    ReworkLimitExceeded { limit: u32 },

    /// Quality approval was requested while a high-severity issue is open.
    #[error("high-severity issue #{index} is still open")]
    UnaddressedHighIssue { index: usize },

    /// A component with the same id was already registered on this record.
    #[error("duplicate component id: {0}")]
    DuplicateComponent(String),

    /// Issue index does not address an existing issue.
    #[error("issue index {index} out of range (issues: {len})")]
    IssueIndexOutOfRange { index: usize, len: usize },

    /// Token does not name a known status.
    #[error("unknown workflow status: {0}")]
    UnknownStatus(String),

    /// Token does not name a known severity.
    #[error("unknown issue severity: {0}")]
    UnknownSeverity(String),

    /// A store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error (archive)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
