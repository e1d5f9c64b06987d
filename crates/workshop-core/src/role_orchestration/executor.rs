//! Call-graph interpreter.
//!
//! A workflow runs as one sequential call chain: the active role decides, the
//! executor performs the decision (tool call or delegation) and feeds the
//! observation back, until the role returns. Delegation recurses and awaits
//! the delegate, so exactly one role is active at a time.
//!
//! Every loop is bounded: call depth, total delegations, turns per role
//! invocation, the workflow deadline and an optional cancellation signal.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument};
use workshop_state::{DelegationRecord, WorkflowMutation};

use crate::context;
use crate::error::{EngineError, EngineResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::role_orchestration::graph::DelegationGraph;
use crate::role_orchestration::roles::{Decision, Observation, RoleId, RoleTask, Turn};
use crate::tools::ToolLayer;

/// Budgets bounding one workflow's call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub max_call_depth: u32,
    pub max_delegations: u32,
    pub max_turns_per_role: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 32,
            max_delegations: 128,
            max_turns_per_role: 64,
        }
    }
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A linked handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> CancelSignal {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender leaves the value at `false` forever.
        drop(tx);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pending forever if it never can.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Executes one workflow's call chain against a graph and tool layer.
pub struct CallChain {
    graph: Arc<DelegationGraph>,
    tools: Arc<ToolLayer>,
    limits: ExecutionLimits,
    deadline: Instant,
    deadline_ms: u64,
    cancel: CancelSignal,
    delegations: AtomicU32,
}

impl CallChain {
    pub fn new(
        graph: Arc<DelegationGraph>,
        tools: Arc<ToolLayer>,
        limits: ExecutionLimits,
        deadline: Duration,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            graph,
            tools,
            limits,
            deadline: Instant::now() + deadline,
            deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            cancel,
            delegations: AtomicU32::new(0),
        }
    }

    /// Number of delegations taken so far.
    pub fn delegations(&self) -> u32 {
        self.delegations.load(Ordering::Relaxed)
    }

    /// Run the graph's entry role with `payload`.
    pub async fn run(&self, payload: Value) -> EngineResult<Value> {
        let entry = self.graph.entry().clone();
        self.invoke(entry, payload, 0).await
    }

    /// Invoke `role` at `depth`. Boxed so delegation can recurse.
    pub fn invoke(&self, role: RoleId, payload: Value, depth: u32) -> BoxFuture<'_, EngineResult<Value>> {
        self.run_role(role, payload, depth).boxed()
    }

    fn check_budget(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(EngineError::DeadlineExceeded {
                deadline_ms: self.deadline_ms,
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(role = %role_id, depth = depth))]
    async fn run_role(&self, role_id: RoleId, payload: Value, depth: u32) -> EngineResult<Value> {
        if depth > self.limits.max_call_depth {
            return Err(EngineError::CallDepthExceeded {
                limit: self.limits.max_call_depth,
            });
        }
        let spec = self
            .graph
            .role(&role_id)
            .ok_or_else(|| EngineError::UnknownRole(role_id.to_string()))?;
        let binding = context::current()?;
        let workflow_id = binding.workflow_id().to_string();

        obs::emit_role_entered(&workflow_id, role_id.as_str(), depth);
        let mut task = RoleTask {
            role: role_id.clone(),
            payload,
            depth,
            entry: binding.record()?,
            transcript: Vec::new(),
        };

        loop {
            self.check_budget()?;
            if task.turn() >= self.limits.max_turns_per_role as usize {
                return Err(EngineError::TurnBudgetExhausted {
                    role: role_id.to_string(),
                    limit: self.limits.max_turns_per_role,
                });
            }

            let snapshot = binding.record()?;
            let decision = spec
                .policy
                .decide(&task, &snapshot)
                .await
                .map_err(|source| EngineError::Policy {
                    role: role_id.to_string(),
                    source,
                })?;
            debug!(turn = task.turn(), ?decision, "role decided");

            let observation = match &decision {
                Decision::InvokeTool(call) => {
                    if !spec.permits_tool(&call.name) {
                        return Err(EngineError::UnauthorizedTool {
                            role: role_id.to_string(),
                            tool: call.name.clone(),
                        });
                    }
                    self.tools.invoke(&role_id, call).await?
                }
                Decision::Delegate { to, payload } => {
                    if !self.graph.permits(&role_id, to) {
                        return Err(EngineError::UnauthorizedDelegation {
                            from: role_id.to_string(),
                            to: to.to_string(),
                        });
                    }
                    // Refused delegations never reach the audit trail.
                    if depth + 1 > self.limits.max_call_depth {
                        return Err(EngineError::CallDepthExceeded {
                            limit: self.limits.max_call_depth,
                        });
                    }
                    let taken = self.delegations.fetch_add(1, Ordering::Relaxed) + 1;
                    if taken > self.limits.max_delegations {
                        return Err(EngineError::DelegationBudgetExhausted {
                            limit: self.limits.max_delegations,
                        });
                    }

                    let bytes = serde_json::to_vec(payload)?;
                    binding.apply(WorkflowMutation::RecordDelegation(DelegationRecord {
                        from: role_id.to_string(),
                        to: to.to_string(),
                        depth: depth + 1,
                        payload_digest: hex::encode(Sha256::digest(&bytes)),
                        timestamp: Utc::now(),
                    }))?;
                    METRICS.inc_delegations();
                    obs::emit_delegation(&workflow_id, role_id.as_str(), to.as_str(), depth + 1);

                    let result = self.invoke(to.clone(), payload.clone(), depth + 1).await?;
                    Observation::Delegated {
                        to: to.clone(),
                        result,
                    }
                }
                Decision::Return { result } => {
                    obs::emit_role_returned(&workflow_id, role_id.as_str(), depth, task.turn());
                    return Ok(result.clone());
                }
            };

            task.transcript.push(Turn {
                decision,
                observation,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{bind, WorkflowBinding};
    use crate::role_orchestration::roles::{RoleSpec, ScriptedPolicy};
    use crate::tools::ToolCall;
    use serde_json::json;
    use workshop_state::{
        MemoryWorkflowStore, WorkflowId, WorkflowRecord, WorkflowStatus, WorkflowStore,
    };

    fn bound() -> WorkflowBinding {
        let store: Arc<dyn WorkflowStore> = Arc::new(MemoryWorkflowStore::new());
        let id = WorkflowId::from("WF-EXEC");
        store
            .create(WorkflowRecord::new(id.clone(), "a spinning top", None, 1))
            .unwrap();
        WorkflowBinding::new(id, store)
    }

    fn chain(graph: DelegationGraph, limits: ExecutionLimits) -> CallChain {
        CallChain::new(
            Arc::new(graph),
            Arc::new(ToolLayer::default()),
            limits,
            Duration::from_secs(10),
            CancelSignal::never(),
        )
    }

    #[tokio::test]
    async fn test_delegation_returns_delegate_result() {
        let graph = DelegationGraph::builder()
            .role(
                RoleSpec::new(
                    "boss",
                    ScriptedPolicy::new(|task| {
                        let echoed = match task.observation(0) {
                            Some(Observation::Delegated { result, .. }) => result.clone(),
                            _ => Value::Null,
                        };
                        Ok(vec![
                            Decision::delegate("worker", json!({ "job": "paint" })),
                            Decision::finish(echoed),
                        ])
                    }),
                )
                .delegating_to(["worker"]),
            )
            .role(RoleSpec::new(
                "worker",
                ScriptedPolicy::new(|task| Ok(vec![Decision::finish(task.payload.clone())])),
            ))
            .entry("boss")
            .build(&ToolLayer::default())
            .unwrap();

        let binding = bound();
        let store = Arc::clone(binding.store());
        let id = binding.workflow_id().clone();
        let chain = chain(graph, ExecutionLimits::default());
        let result = bind(binding, chain.run(Value::Null)).await.unwrap().unwrap();

        assert_eq!(result, json!({ "job": "paint" }));
        let record = store.get(&id).unwrap();
        assert_eq!(record.delegations.len(), 1);
        assert_eq!(record.delegations[0].from, "boss");
        assert_eq!(record.delegations[0].depth, 1);
    }

    #[tokio::test]
    async fn test_unpermitted_tool_is_a_fault() {
        let graph = DelegationGraph::builder()
            .role(RoleSpec::new(
                "sneaky",
                ScriptedPolicy::fixed(vec![Decision::tool(ToolCall::update_status(
                    WorkflowStatus::Designed,
                ))]),
            ))
            .entry("sneaky")
            .build(&ToolLayer::default())
            .unwrap();
        let chain = chain(graph, ExecutionLimits::default());
        let err = bind(bound(), chain.run(Value::Null)).await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::UnauthorizedTool { tool, .. } if tool == "update_status"));
    }

    #[tokio::test]
    async fn test_self_loop_hits_depth_limit() {
        let graph = DelegationGraph::builder()
            .role(
                RoleSpec::new(
                    "echo",
                    ScriptedPolicy::fixed(vec![Decision::delegate("echo", Value::Null)]),
                )
                .delegating_to(["echo"]),
            )
            .entry("echo")
            .build(&ToolLayer::default())
            .unwrap();
        let limits = ExecutionLimits {
            max_call_depth: 5,
            ..ExecutionLimits::default()
        };
        let chain = chain(graph, limits);
        let err = bind(bound(), chain.run(Value::Null)).await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::CallDepthExceeded { limit: 5 }));
        assert_eq!(chain.delegations(), 5);
    }

    #[tokio::test]
    async fn test_refused_delegation_is_not_recorded() {
        let graph = DelegationGraph::builder()
            .role(
                RoleSpec::new(
                    "echo",
                    ScriptedPolicy::fixed(vec![Decision::delegate("echo", Value::Null)]),
                )
                .delegating_to(["echo"]),
            )
            .entry("echo")
            .build(&ToolLayer::default())
            .unwrap();
        let limits = ExecutionLimits {
            max_call_depth: 2,
            ..ExecutionLimits::default()
        };
        let binding = bound();
        let store = Arc::clone(binding.store());
        let id = binding.workflow_id().clone();
        let chain = chain(graph, limits);
        let err = bind(binding, chain.run(Value::Null)).await.unwrap().unwrap_err();

        assert!(matches!(err, EngineError::CallDepthExceeded { limit: 2 }));
        let record = store.get(&id).unwrap();
        let depths: Vec<_> = record.delegations.iter().map(|d| d.depth).collect();
        assert_eq!(depths, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delegation_budget_is_shared_across_the_chain() {
        // Each invocation of `fan` delegates to `leaf` many times.
        let graph = DelegationGraph::builder()
            .role(
                RoleSpec::new(
                    "fan",
                    ScriptedPolicy::fixed(vec![Decision::delegate("leaf", Value::Null); 10]),
                )
                .delegating_to(["leaf"]),
            )
            .role(RoleSpec::new("leaf", ScriptedPolicy::returning(Value::Null)))
            .entry("fan")
            .build(&ToolLayer::default())
            .unwrap();
        let limits = ExecutionLimits {
            max_delegations: 3,
            ..ExecutionLimits::default()
        };
        let chain = chain(graph, limits);
        let err = bind(bound(), chain.run(Value::Null)).await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::DelegationBudgetExhausted { limit: 3 }));
    }

    #[tokio::test]
    async fn test_turn_budget() {
        let graph = DelegationGraph::builder()
            .role(
                RoleSpec::new(
                    "reader",
                    ScriptedPolicy::fixed(vec![Decision::tool(ToolCall::read_state()); 100]),
                )
                .with_tools(["read_state"]),
            )
            .entry("reader")
            .build(&ToolLayer::default())
            .unwrap();
        let limits = ExecutionLimits {
            max_turns_per_role: 4,
            ..ExecutionLimits::default()
        };
        let chain = chain(graph, limits);
        let err = bind(bound(), chain.run(Value::Null)).await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::TurnBudgetExhausted { limit: 4, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_signal_stops_before_first_turn() {
        let graph = DelegationGraph::builder()
            .role(RoleSpec::new("idle", ScriptedPolicy::returning(Value::Null)))
            .entry("idle")
            .build(&ToolLayer::default())
            .unwrap();
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        let chain = CallChain::new(
            Arc::new(graph),
            Arc::new(ToolLayer::default()),
            ExecutionLimits::default(),
            Duration::from_secs(10),
            signal,
        );
        let err = bind(bound(), chain.run(Value::Null)).await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
