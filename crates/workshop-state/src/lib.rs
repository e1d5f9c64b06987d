//! Workshop State: record model and storage for workflow instances
//!
//! One [`WorkflowRecord`] exists per workflow instance. It changes only
//! through [`WorkflowMutation`]s, which enforce the append-only lists, the
//! monotonic `updated_at` and the [`WorkflowStatus`] state machine.
//!
//! ## Key Components
//!
//! - `WorkflowRecord`: the shared document roles read and mutate
//! - `WorkflowStatus`: closed status machine with one bounded back-edge (rework)
//! - `WorkflowStore`: keyed storage (`create/get/apply/evict/compact`)
//! - `MemoryWorkflowStore`: concurrent in-memory implementation
//! - `RetentionPolicy`: TTL / max-count eviction of finished records
//! - `FileRecordArchive`: JSON archive for evicted records

mod archive;
mod error;
pub mod memory;
pub mod mutation;
pub mod record;
pub mod retention;
pub mod status;
pub mod store;

pub use archive::FileRecordArchive;
pub use error::StateError;
pub use memory::MemoryWorkflowStore;
pub use mutation::{DesignUpdate, MutationOutcome, NewComponent, WorkflowMutation};
pub use record::{
    ApprovalDecision, BomEntry, Component, DelegationRecord, Feasibility, FinalApproval,
    FinalResponse, Fulfilment, Issue, LogEntry, QualityReport, QualityVerdict, Severity,
    StateSnapshot, SubjectInfo, WorkflowRecord,
};
pub use retention::RetentionPolicy;
pub use status::WorkflowStatus;
pub use store::{EvictionReport, StateResult, WorkflowId, WorkflowStore};
