//! Engine-level faults.
//!
//! Every variant here is a fault: it propagates with `?` up the call chain to
//! the orchestrator, which records it on the workflow and marks the workflow
//! `failed`. Business-level problems are not errors; roles report them as
//! issues on the record.

use workshop_state::{StateError, WorkflowId};

use crate::config::ConfigError;
use crate::role_orchestration::error::{GraphError, PolicyError};

/// Errors raised while executing a workflow.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no workflow is bound to the current task")]
    NoActiveWorkflow,

    #[error("workflow {0} is already bound to the current task")]
    AlreadyBound(WorkflowId),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("role {role} is not permitted to use tool {tool}")]
    UnauthorizedTool { role: String, tool: String },

    #[error("role {from} is not permitted to delegate to {to}")]
    UnauthorizedDelegation { from: String, to: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidToolArgs { tool: String, reason: String },

    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: u32 },

    #[error("delegation budget of {limit} exhausted")]
    DelegationBudgetExhausted { limit: u32 },

    #[error("role {role} exceeded its budget of {limit} turns")]
    TurnBudgetExhausted { role: String, limit: u32 },

    #[error("workflow deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("workflow cancelled")]
    Cancelled,

    #[error("role {role} failed: {source}")]
    Policy {
        role: String,
        #[source]
        source: PolicyError,
    },

    #[error("admission rejected: {active} of {limit} workflow slots in use")]
    AdmissionRejected { active: usize, limit: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
