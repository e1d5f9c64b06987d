//! Workshop Core: role-delegation workflow engine
//!
//! A request becomes a [`WorkflowRecord`](workshop_state::WorkflowRecord).
//! Roles take turns on it: each turn a role's policy either calls a tool,
//! delegates to a role its graph edges allow, or returns. The orchestrator
//! turns every fault into a `failed` record instead of an error.
//!
//! ## Key Components
//!
//! - `context`: binds the active workflow id to the executing task
//! - `tools`: state tools and external capabilities behind one call shape
//! - `role_orchestration`: roles, the delegation graph and the call-chain executor
//! - `orchestrator`: admission, deadlines, cancellation and fault containment
//! - `workshop`: the standard rule-driven role roster

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod role_orchestration;
pub mod telemetry;
pub mod tools;
pub mod workshop;

pub use config::{AdmissionPolicy, ConfigError, EngineConfig};
pub use context::WorkflowBinding;
pub use error::{EngineError, EngineResult};
pub use metrics::METRICS;
pub use orchestrator::{WorkflowEngine, WorkflowEngineBuilder, ORCHESTRATOR};
pub use role_orchestration::error::{GraphError, PolicyError};
pub use role_orchestration::executor::{CancelHandle, CancelSignal, ExecutionLimits};
pub use role_orchestration::graph::{DelegationGraph, DelegationGraphBuilder};
pub use role_orchestration::roles::{
    Decision, Observation, RoleId, RolePolicy, RoleSpec, RoleTask, ScriptedPolicy, Turn,
};
pub use telemetry::init_tracing;
pub use tools::{CapabilityRegistry, ExternalCapability, StateTool, ToolCall, ToolLayer};
pub use workshop::{standard_engine, standard_graph, WorkshopOptions};
