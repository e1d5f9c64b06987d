//! Core role vocabulary: `RoleId`, `Decision`, `RoleTask`, `RolePolicy`, `RoleSpec`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use workshop_state::WorkflowRecord;

use crate::role_orchestration::error::PolicyError;
use crate::tools::ToolCall;

/// Identity of a role in a delegation graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One step chosen by a role's policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Call a permitted tool or external capability.
    InvokeTool(ToolCall),
    /// Hand work to a permitted role and wait for its result.
    Delegate { to: RoleId, payload: Value },
    /// Finish this invocation with a result for the caller.
    Return { result: Value },
}

impl Decision {
    pub fn tool(call: ToolCall) -> Self {
        Decision::InvokeTool(call)
    }

    pub fn delegate(to: impl Into<RoleId>, payload: Value) -> Self {
        Decision::Delegate {
            to: to.into(),
            payload,
        }
    }

    pub fn finish(result: Value) -> Self {
        Decision::Return { result }
    }
}

/// What a decision produced, fed back to the deciding role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Tool { name: String, output: Value },
    /// An external capability failed. Data for the role, not a fault.
    ToolFailed { name: String, error: String },
    Delegated { to: RoleId, result: Value },
}

impl Observation {
    pub fn is_failure(&self) -> bool {
        matches!(self, Observation::ToolFailed { .. })
    }
}

/// A decision together with its observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub decision: Decision,
    pub observation: Observation,
}

/// Everything a role knows about the invocation it is serving.
#[derive(Debug, Clone)]
pub struct RoleTask {
    pub role: RoleId,
    pub payload: Value,
    /// Delegation depth; the entry role runs at depth 0.
    pub depth: u32,
    /// The record as it was when the role was entered.
    pub entry: WorkflowRecord,
    pub transcript: Vec<Turn>,
}

impl RoleTask {
    /// Index of the next decision.
    pub fn turn(&self) -> usize {
        self.transcript.len()
    }

    pub fn observation(&self, turn: usize) -> Option<&Observation> {
        self.transcript.get(turn).map(|t| &t.observation)
    }

    /// Whether this invocation was sent back for rework.
    pub fn is_rework(&self) -> bool {
        self.payload
            .get("rework")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Pluggable decision procedure.
///
/// Given the task and the current record, choose the next step. Scripted stubs
/// and model-backed adapters both implement this.
#[async_trait]
pub trait RolePolicy: Send + Sync {
    async fn decide(
        &self,
        task: &RoleTask,
        snapshot: &WorkflowRecord,
    ) -> Result<Decision, PolicyError>;
}

type ScriptFn = dyn Fn(&RoleTask) -> Result<Vec<Decision>, PolicyError> + Send + Sync;

/// Deterministic policy replaying a script built from the task.
///
/// The script closure is re-evaluated every turn; decision `n` may depend on
/// the observations of turns `0..n`. Once the script runs out the role returns
/// a plain completion result.
#[derive(Clone)]
pub struct ScriptedPolicy {
    script: Arc<ScriptFn>,
}

impl std::fmt::Debug for ScriptedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPolicy").finish_non_exhaustive()
    }
}

impl ScriptedPolicy {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&RoleTask) -> Result<Vec<Decision>, PolicyError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
        }
    }

    /// Same decisions on every invocation.
    pub fn fixed(decisions: Vec<Decision>) -> Self {
        Self::new(move |_| Ok(decisions.clone()))
    }

    /// Return immediately with `result`.
    pub fn returning(result: Value) -> Self {
        Self::fixed(vec![Decision::finish(result)])
    }
}

#[async_trait]
impl RolePolicy for ScriptedPolicy {
    async fn decide(
        &self,
        task: &RoleTask,
        _snapshot: &WorkflowRecord,
    ) -> Result<Decision, PolicyError> {
        let script = (self.script)(task)?;
        Ok(script.get(task.turn()).cloned().unwrap_or_else(|| {
            Decision::finish(json!({ "role": task.role.as_str(), "status": "done" }))
        }))
    }
}

/// A role definition: identity, permissions and policy.
#[derive(Clone)]
pub struct RoleSpec {
    pub id: RoleId,
    pub description: String,
    pub tools: BTreeSet<String>,
    pub delegates_to: BTreeSet<RoleId>,
    pub policy: Arc<dyn RolePolicy>,
}

impl std::fmt::Debug for RoleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSpec")
            .field("id", &self.id)
            .field("tools", &self.tools)
            .field("delegates_to", &self.delegates_to)
            .finish_non_exhaustive()
    }
}

impl RoleSpec {
    pub fn new(id: impl Into<RoleId>, policy: impl RolePolicy + 'static) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tools: BTreeSet::new(),
            delegates_to: BTreeSet::new(),
            policy: Arc::new(policy),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn delegating_to<I, R>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleId>,
    {
        self.delegates_to
            .extend(targets.into_iter().map(Into::into));
        self
    }

    /// Same permissions, different decision procedure.
    pub fn with_policy(mut self, policy: impl RolePolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn permits_tool(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workshop_state::WorkflowId;

    fn task(turns: usize) -> RoleTask {
        let decision = Decision::tool(ToolCall::read_state());
        let observation = Observation::Tool {
            name: "read_state".into(),
            output: Value::Null,
        };
        RoleTask {
            role: RoleId::from("designer"),
            payload: json!({}),
            depth: 0,
            entry: WorkflowRecord::new(WorkflowId::from("WF-T"), "a yo-yo", None, 1),
            transcript: vec![
                Turn {
                    decision,
                    observation,
                };
                turns
            ],
        }
    }

    #[test]
    fn test_decision_serde_tagging() {
        let d = Decision::delegate("production_manager", json!({ "rework": true }));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["kind"], "delegate");
        assert_eq!(v["to"], "production_manager");

        let r = Decision::finish(json!("done"));
        let back: Decision = serde_json::from_value(serde_json::to_value(&r).unwrap()).unwrap();
        assert_eq!(back, r);
    }

    #[tokio::test]
    async fn test_scripted_policy_replays_by_turn() {
        let policy = ScriptedPolicy::fixed(vec![
            Decision::tool(ToolCall::read_state()),
            Decision::finish(json!({ "n": 1 })),
        ]);
        let snapshot = task(0).entry;
        assert_eq!(
            policy.decide(&task(0), &snapshot).await.unwrap(),
            Decision::tool(ToolCall::read_state())
        );
        assert_eq!(
            policy.decide(&task(1), &snapshot).await.unwrap(),
            Decision::finish(json!({ "n": 1 }))
        );
        // Past the end of the script the role completes.
        match policy.decide(&task(5), &snapshot).await.unwrap() {
            Decision::Return { result } => assert_eq!(result["role"], "designer"),
            other => panic!("expected Return, got {other:?}"),
        }
    }

    #[test]
    fn test_role_spec_permissions() {
        let spec = RoleSpec::new("quality_manager", ScriptedPolicy::returning(Value::Null))
            .with_tools(["read_state", "report_issue"])
            .delegating_to(["logistics_manager"]);
        assert!(spec.permits_tool("report_issue"));
        assert!(!spec.permits_tool("add_component"));
        assert!(spec.delegates_to.contains(&RoleId::from("logistics_manager")));
    }

    #[test]
    fn test_rework_flag_read_from_payload() {
        let mut t = task(0);
        assert!(!t.is_rework());
        t.payload = json!({ "rework": true });
        assert!(t.is_rework());
    }
}
