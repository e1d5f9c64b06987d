//! In-memory record store.
//!
//! `MemoryWorkflowStore` backs the engine by default. Distinct workflows
//! insert and look up concurrently; a given record only ever has one writer,
//! so the write lock is held for a single mutation at a time.
//!
//! Each record carries a `closed` flag set once its execution has ended, so
//! records a run left in a non-terminal status are still reclaimed.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StateError;
use crate::mutation::{MutationOutcome, WorkflowMutation};
use crate::record::WorkflowRecord;
use crate::retention::{select_evictions, RetentionPolicy};
use crate::store::{EvictionReport, StateResult, WorkflowId, WorkflowStore};

#[derive(Debug)]
struct Slot {
    record: WorkflowRecord,
    closed: bool,
}

impl Slot {
    fn finished(&self) -> bool {
        self.closed || self.record.is_terminal()
    }
}

/// In-memory store backed by a `HashMap` keyed on [`WorkflowId`].
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    records: RwLock<HashMap<WorkflowId, Slot>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowStore for MemoryWorkflowStore {
    fn create(&self, record: WorkflowRecord) -> StateResult<()> {
        let mut records = self.records.write().map_err(|_| StateError::LockPoisoned)?;
        if records.contains_key(&record.workflow_id) {
            return Err(StateError::AlreadyExists(record.workflow_id));
        }
        debug!(workflow_id = %record.workflow_id, "record created");
        records.insert(
            record.workflow_id.clone(),
            Slot {
                record,
                closed: false,
            },
        );
        Ok(())
    }

    fn get(&self, id: &WorkflowId) -> StateResult<WorkflowRecord> {
        let records = self.records.read().map_err(|_| StateError::LockPoisoned)?;
        records
            .get(id)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| StateError::NotFound(id.clone()))
    }

    fn apply(&self, id: &WorkflowId, mutation: WorkflowMutation) -> StateResult<MutationOutcome> {
        let mut records = self.records.write().map_err(|_| StateError::LockPoisoned)?;
        let slot = records
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.clone()))?;
        let op = mutation.op();
        let outcome = slot.record.apply(mutation, Utc::now())?;
        debug!(workflow_id = %id, op, revision = slot.record.revision, "mutation applied");
        Ok(outcome)
    }

    fn close(&self, id: &WorkflowId) -> StateResult<()> {
        let mut records = self.records.write().map_err(|_| StateError::LockPoisoned)?;
        let slot = records
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.clone()))?;
        if !slot.closed {
            slot.closed = true;
            debug!(workflow_id = %id, status = %slot.record.status, "record closed");
        }
        Ok(())
    }

    fn evict(&self, id: &WorkflowId) -> StateResult<WorkflowRecord> {
        let mut records = self.records.write().map_err(|_| StateError::LockPoisoned)?;
        let slot = records
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.clone()))?;
        if !slot.finished() {
            return Err(StateError::StillActive {
                id: id.clone(),
                status: slot.record.status,
            });
        }
        records
            .remove(id)
            .map(|slot| slot.record)
            .ok_or_else(|| StateError::NotFound(id.clone()))
    }

    fn ids(&self) -> StateResult<Vec<WorkflowId>> {
        let records = self.records.read().map_err(|_| StateError::LockPoisoned)?;
        let mut ids: Vec<WorkflowId> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn len(&self) -> StateResult<usize> {
        let records = self.records.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(records.len())
    }

    fn compact(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> StateResult<EvictionReport> {
        let mut records = self.records.write().map_err(|_| StateError::LockPoisoned)?;
        let doomed = select_evictions(
            records.values().map(|slot| (&slot.record, slot.finished())),
            policy,
            now,
        );
        let evicted: Vec<WorkflowRecord> = doomed
            .iter()
            .filter_map(|id| records.remove(id).map(|slot| slot.record))
            .collect();
        Ok(EvictionReport {
            evicted,
            remaining_count: records.len(),
        })
    }
}
