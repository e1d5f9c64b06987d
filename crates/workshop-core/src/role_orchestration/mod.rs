//! Role orchestration.
//!
//! Roles are named units with a fixed tool set, a fixed set of roles they may
//! delegate to, and a pluggable decision policy. The delegation graph wires
//! them together; the executor interprets the call graph for one workflow.
//!
//! # Module layout
//!
//! - [`roles`]: `RoleId`, `Decision`, `Observation`, `RoleTask`, `RolePolicy`, `ScriptedPolicy`, `RoleSpec`
//! - [`error`]: `GraphError`, `PolicyError`
//! - [`graph`]: `DelegationGraph`, `DelegationGraphBuilder`
//! - [`executor`]: `CallChain`, `ExecutionLimits`, `CancelSignal`

pub mod error;
pub mod executor;
pub mod graph;
pub mod roles;
