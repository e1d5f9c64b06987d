//! Behavioral contract tests for `WorkflowStore`.
//!
//! Written against the trait object so any conforming implementation can be
//! dropped in; exercised here with `MemoryWorkflowStore`.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use workshop_state::{
    MutationOutcome, NewComponent, RetentionPolicy, Severity, StateError, WorkflowId,
    WorkflowMutation, WorkflowRecord, WorkflowStatus, WorkflowStore,
};
use workshop_state::MemoryWorkflowStore;

fn store() -> Arc<dyn WorkflowStore> {
    Arc::new(MemoryWorkflowStore::new())
}

fn seeded(store: &Arc<dyn WorkflowStore>, id: &str) -> WorkflowId {
    let id = WorkflowId::from(id);
    store
        .create(WorkflowRecord::new(id.clone(), "a red remote-control car", None, 2))
        .unwrap();
    id
}

fn mixed_mutations() -> Vec<WorkflowMutation> {
    vec![
        WorkflowMutation::LogAction {
            agent: "reception_manager".into(),
            action: "intake".into(),
            details: "parsed request".into(),
        },
        WorkflowMutation::UpdateStatus {
            status: WorkflowStatus::Designed,
        },
        WorkflowMutation::AddComponent(NewComponent {
            id: "chassis-1".into(),
            component_type: "chassis".into(),
            material: "red PLA".into(),
            dimensions: "15x10x5cm".into(),
            details: String::new(),
            created_by: "3d_printer_elf".into(),
        }),
        WorkflowMutation::ReportIssue {
            reported_by: "battery_elf".into(),
            severity: Severity::Medium,
            description: "loose battery clip".into(),
        },
        WorkflowMutation::ResolveIssue { index: 0 },
        WorkflowMutation::UpdateStatus {
            status: WorkflowStatus::InProduction,
        },
    ]
}

#[test]
fn updated_at_never_decreases() {
    let store = store();
    let id = seeded(&store, "WF-MONO");
    let mut last = store.get(&id).unwrap().updated_at;
    for m in mixed_mutations() {
        store.apply(&id, m).unwrap();
        let now = store.get(&id).unwrap().updated_at;
        assert!(now >= last, "updated_at went backwards");
        last = now;
    }
}

#[test]
fn append_only_lists_never_shrink() {
    let store = store();
    let id = seeded(&store, "WF-APPEND");
    let mut lens = (0, 0, 0);
    for m in mixed_mutations() {
        store.apply(&id, m).unwrap();
        let r = store.get(&id).unwrap();
        let next = (r.components.len(), r.manufacturing_log.len(), r.issues.len());
        assert!(next.0 >= lens.0 && next.1 >= lens.1 && next.2 >= lens.2);
        lens = next;
    }
    assert_eq!(lens, (1, 1, 1));
}

#[test]
fn resolving_an_issue_changes_only_its_flag() {
    let store = store();
    let id = seeded(&store, "WF-RESOLVE");
    for description in ["scratch on hood", "antenna too sharp"] {
        store
            .apply(
                &id,
                WorkflowMutation::ReportIssue {
                    reported_by: "quality_manager".into(),
                    severity: Severity::High,
                    description: description.into(),
                },
            )
            .unwrap();
    }

    let before = serde_json::to_value(store.get(&id).unwrap()).unwrap();
    store
        .apply(&id, WorkflowMutation::ResolveIssue { index: 1 })
        .unwrap();
    let after = serde_json::to_value(store.get(&id).unwrap()).unwrap();

    let mut expected = before.clone();
    expected["issues"][1]["resolved"] = serde_json::Value::Bool(true);
    expected["updated_at"] = after["updated_at"].clone();
    expected["revision"] = after["revision"].clone();
    assert_eq!(after, expected);
    assert_eq!(after["issues"][0]["resolved"], false);
}

#[test]
fn status_updates_are_validated() {
    let store = store();
    let id = seeded(&store, "WF-STATUS");
    let err = store
        .apply(
            &id,
            WorkflowMutation::UpdateStatus {
                status: WorkflowStatus::Completed,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StateError::IllegalTransition {
            from: WorkflowStatus::Received,
            to: WorkflowStatus::Completed
        }
    ));

    let outcome = store
        .apply(
            &id,
            WorkflowMutation::UpdateStatus {
                status: WorkflowStatus::Designed,
            },
        )
        .unwrap();
    assert_eq!(
        outcome,
        MutationOutcome::StatusChanged {
            from: WorkflowStatus::Received,
            to: WorkflowStatus::Designed
        }
    );
}

#[test]
fn apply_to_unknown_record_is_not_found() {
    let store = store();
    let err = store
        .apply(&WorkflowId::from("WF-GHOST"), WorkflowMutation::ForceFail)
        .unwrap_err();
    assert!(matches!(err, StateError::NotFound(_)));
}

#[test]
fn concurrent_instances_do_not_interfere() {
    let store = store();
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let id = WorkflowId::from(format!("WF-CONC-{n}"));
                store
                    .create(WorkflowRecord::new(id.clone(), format!("gift {n}"), None, 1))
                    .unwrap();
                for i in 0..25 {
                    store
                        .apply(
                            &id,
                            WorkflowMutation::LogAction {
                                agent: format!("elf-{n}"),
                                action: "step".into(),
                                details: i.to_string(),
                            },
                        )
                        .unwrap();
                }
                id
            })
        })
        .collect();

    for handle in handles {
        let id = handle.join().unwrap();
        let record = store.get(&id).unwrap();
        assert_eq!(record.manufacturing_log.len(), 25);
        let agent = &record.manufacturing_log[0].agent;
        assert!(record.manufacturing_log.iter().all(|e| &e.agent == agent));
    }
    assert_eq!(store.len().unwrap(), 8);
}

#[test]
fn compaction_only_evicts_finished_records() {
    let store = store();
    let done = seeded(&store, "WF-DONE");
    let active = seeded(&store, "WF-ACTIVE");
    store.apply(&done, WorkflowMutation::ForceFail).unwrap();

    let policy = RetentionPolicy {
        ttl_secs: Some(0),
        max_records: None,
    };
    let report = store
        .compact(&policy, Utc::now() + Duration::seconds(5))
        .unwrap();
    assert_eq!(report.removed_ids(), vec![done.clone()]);
    assert_eq!(report.remaining_count, 1);
    assert!(store.get(&active).is_ok());
    assert!(matches!(store.get(&done), Err(StateError::NotFound(_))));
}
