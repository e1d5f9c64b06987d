//! Orchestrator limits: deadlines, cancellation, admission, call budgets and
//! retention. Faults must always surface as a `failed` record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use workshop_core::{
    AdmissionPolicy, CancelSignal, Decision, DelegationGraph, DelegationGraphBuilder, EngineConfig,
    EngineError, GraphError, PolicyError, RolePolicy, RoleSpec, RoleTask, ScriptedPolicy,
    ToolCall, WorkflowEngine, ORCHESTRATOR,
};
use workshop_state::{RetentionPolicy, Severity, WorkflowRecord, WorkflowStatus};

/// Policy that reads state forever, pausing between turns.
struct Dawdler {
    pause: Duration,
}

#[async_trait]
impl RolePolicy for Dawdler {
    async fn decide(
        &self,
        _task: &RoleTask,
        _snapshot: &WorkflowRecord,
    ) -> Result<Decision, PolicyError> {
        tokio::time::sleep(self.pause).await;
        Ok(Decision::tool(ToolCall::read_state()))
    }
}

/// Policy that announces itself, then holds until released.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl RolePolicy for Gate {
    async fn decide(
        &self,
        task: &RoleTask,
        _snapshot: &WorkflowRecord,
    ) -> Result<Decision, PolicyError> {
        if task.turn() == 0 {
            self.entered.notify_one();
            self.release.notified().await;
            return Ok(Decision::tool(ToolCall::update_status(
                WorkflowStatus::Failed,
            )));
        }
        Ok(Decision::finish(Value::Null))
    }
}

fn single(policy: impl RolePolicy + 'static) -> DelegationGraphBuilder {
    DelegationGraph::builder()
        .role(
            RoleSpec::new("clerk", policy).with_tools(["read_state", "update_status", "log_action"]),
        )
        .entry("clerk")
}

fn assert_fault(record: &WorkflowRecord, needle: &str) {
    assert_eq!(record.status, WorkflowStatus::Failed);
    let issue = record
        .issues
        .iter()
        .find(|i| i.reported_by == ORCHESTRATOR)
        .expect("orchestrator issue");
    assert_eq!(issue.severity, Severity::High);
    assert!(
        issue.description.contains(needle),
        "{:?} does not mention {needle:?}",
        issue.description
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fails_workflow() {
    let config = EngineConfig {
        deadline_ms: 1_000,
        max_turns_per_role: 10_000,
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(single(Dawdler {
        pause: Duration::from_millis(100),
    }))
    .config(config)
    .build()
    .unwrap();

    let record = engine.process("a slow request", None).await;
    assert_fault(&record, "deadline of 1000ms exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_fails_workflow() {
    let config = EngineConfig {
        max_turns_per_role: 10_000,
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        WorkflowEngine::builder(single(Dawdler {
            pause: Duration::from_millis(50),
        }))
        .config(config)
        .build()
        .unwrap(),
    );

    let (handle, signal) = CancelSignal::pair();
    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .process_with_cancel("please stop me", None, signal)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.cancel();

    let record = running.await.unwrap();
    assert_fault(&record, "cancelled");
    assert!(engine.record(&record.workflow_id).unwrap().is_terminal());
}

#[tokio::test]
async fn test_reject_admission_when_full() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let config = EngineConfig {
        max_concurrent_workflows: 1,
        admission: AdmissionPolicy::Reject,
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        WorkflowEngine::builder(single(Gate {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }))
        .config(config)
        .build()
        .unwrap(),
    );

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.process("first", None).await })
    };
    entered.notified().await;

    let rejected = engine.process("second", None).await;
    assert_fault(&rejected, "admission rejected: 1 of 1 workflow slots in use");

    release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.status, WorkflowStatus::Failed);
    assert!(first.issues.is_empty());
    assert_ne!(first.workflow_id, rejected.workflow_id);
}

#[tokio::test]
async fn test_queue_admission_waits_for_a_slot() {
    let config = EngineConfig {
        max_concurrent_workflows: 1,
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        WorkflowEngine::builder(single(ScriptedPolicy::fixed(vec![Decision::tool(
            ToolCall::update_status(WorkflowStatus::Failed),
        )])))
        .config(config)
        .build()
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.process(&format!("request {i}"), None).await })
        })
        .collect();
    for handle in handles {
        let record = handle.await.unwrap();
        assert_eq!(record.status, WorkflowStatus::Failed);
        assert!(record.issues.is_empty(), "queued workflows are not rejected");
    }
}

#[tokio::test]
async fn test_call_depth_limit() {
    let graph = DelegationGraph::builder()
        .role(
            RoleSpec::new(
                "echo",
                ScriptedPolicy::fixed(vec![Decision::delegate("echo", json!({}))]),
            )
            .delegating_to(["echo"]),
        )
        .entry("echo");
    let config = EngineConfig {
        max_call_depth: 4,
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(graph).config(config).build().unwrap();

    let record = engine.process("recurse", None).await;
    assert_fault(&record, "call depth limit of 4 exceeded");
    assert_eq!(record.delegations.len(), 4);
    assert!(record.delegations.iter().all(|d| d.depth <= 4));
}

#[tokio::test]
async fn test_delegation_budget() {
    let graph = DelegationGraph::builder()
        .role(
            RoleSpec::new(
                "caller",
                ScriptedPolicy::fixed(vec![Decision::delegate("callee", json!({})); 10]),
            )
            .delegating_to(["callee"]),
        )
        .role(RoleSpec::new("callee", ScriptedPolicy::returning(json!("ok"))))
        .entry("caller");
    let config = EngineConfig {
        max_delegations: 3,
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(graph).config(config).build().unwrap();

    let record = engine.process("fan out", None).await;
    assert_fault(&record, "delegation budget of 3 exhausted");
    assert_eq!(record.delegations.len(), 3);
}

#[tokio::test]
async fn test_turn_budget() {
    let config = EngineConfig {
        max_turns_per_role: 5,
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(single(Dawdler {
        pause: Duration::ZERO,
    }))
    .config(config)
    .build()
    .unwrap();

    let record = engine.process("loop", None).await;
    assert_fault(&record, "role clerk exceeded its budget of 5 turns");
}

#[tokio::test]
async fn test_unpermitted_tool_is_a_fault() {
    let engine = WorkflowEngine::builder(single(ScriptedPolicy::fixed(vec![Decision::tool(
        ToolCall::resolve_issue(0),
    )])))
    .build()
    .unwrap();

    let record = engine.process("sneaky", None).await;
    assert_fault(&record, "role clerk is not permitted to use tool resolve_issue");
}

#[test]
fn test_invalid_graph_is_rejected_at_build() {
    let err = WorkflowEngine::builder(
        DelegationGraph::builder()
            .role(
                RoleSpec::new("clerk", ScriptedPolicy::returning(Value::Null))
                    .with_tools(["teleport"]),
            )
            .entry("clerk"),
    )
    .build()
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Graph(GraphError::UnknownTool { ref tool, .. }) if tool == "teleport"
    ));
}

#[test]
fn test_invalid_config_is_rejected_at_build() {
    let config = EngineConfig {
        max_concurrent_workflows: 0,
        ..EngineConfig::default()
    };
    let err = WorkflowEngine::builder(single(ScriptedPolicy::returning(Value::Null)))
        .config(config)
        .build()
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[tokio::test]
async fn test_retention_archives_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        retention: RetentionPolicy {
            ttl_secs: None,
            max_records: Some(2),
        },
        archive_dir: Some(dir.path().to_path_buf()),
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(single(ScriptedPolicy::fixed(vec![Decision::tool(
        ToolCall::update_status(WorkflowStatus::Failed),
    )])))
    .config(config)
    .build()
    .unwrap();

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(engine.process(&format!("request {i}"), None).await.workflow_id);
    }

    assert_eq!(engine.store().len().unwrap(), 2);
    for (i, id) in ids.iter().enumerate() {
        // Evicted records are still reachable through the archive.
        let record = engine.record(id).unwrap();
        assert_eq!(record.request, format!("request {i}"));
    }
}

#[tokio::test]
async fn test_runs_ending_in_open_status_are_reclaimed() {
    let config = EngineConfig {
        retention: RetentionPolicy {
            ttl_secs: Some(0),
            max_records: Some(0),
        },
        ..EngineConfig::default()
    };
    let engine = WorkflowEngine::builder(single(ScriptedPolicy::returning(Value::Null)))
        .config(config)
        .build()
        .unwrap();

    for i in 0..50 {
        let record = engine.process(&format!("request {i}"), None).await;
        assert_eq!(record.status, WorkflowStatus::Received);
    }
    assert_eq!(engine.store().len().unwrap(), 0);
}

#[tokio::test]
async fn test_quality_approval_requires_open_high_issues_resolved() {
    use WorkflowStatus::*;

    let walk_past_issue = ScriptedPolicy::fixed(vec![
        Decision::tool(ToolCall::update_status(Designed)),
        Decision::tool(ToolCall::update_status(InProduction)),
        Decision::tool(ToolCall::report_issue(
            "battery_elf",
            Severity::High,
            "battery overheats",
        )),
        Decision::tool(ToolCall::update_status(QualityReview)),
        Decision::tool(ToolCall::update_status(QualityApproved)),
        Decision::finish(Value::Null),
    ]);
    let graph = DelegationGraph::builder()
        .role(
            RoleSpec::new("inspector", walk_past_issue)
                .with_tools(["update_status", "report_issue"]),
        )
        .entry("inspector");
    let engine = WorkflowEngine::builder(graph).build().unwrap();

    let record = engine.process("a remote-control car", None).await;
    assert_fault(&record, "high-severity issue #0 is still open");
    assert!(record.quality_report.is_none());
    assert!(!record.issues[0].resolved);
}
