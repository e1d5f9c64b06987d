//! Retention policy for finished workflow records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::WorkflowRecord;
use crate::store::WorkflowId;

/// Policy controlling which finished records are evicted from a store.
///
/// Records still executing are never eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Evict finished records whose last update is older than this many seconds.
    pub ttl_secs: Option<u64>,
    /// Keep at most this many records (oldest finished removed first).
    pub max_records: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: Some(24 * 60 * 60),
            max_records: Some(1000),
        }
    }
}

impl RetentionPolicy {
    /// Keep everything.
    pub fn keep_all() -> Self {
        Self {
            ttl_secs: None,
            max_records: None,
        }
    }
}

/// Choose the ids to evict from `(record, finished)` pairs, in order:
/// 1. Finished records older than the TTL
/// 2. Oldest finished records while the total exceeds `max_records`
pub fn select_evictions<'a>(
    records: impl IntoIterator<Item = (&'a WorkflowRecord, bool)>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<WorkflowId> {
    let mut total = 0usize;
    let mut finished: Vec<(&WorkflowId, DateTime<Utc>)> = Vec::new();
    for (record, done) in records {
        total += 1;
        if done {
            finished.push((&record.workflow_id, record.updated_at));
        }
    }
    // Oldest first, then id for deterministic tie-breaking.
    finished.sort_by(|(id_a, ts_a), (id_b, ts_b)| ts_a.cmp(ts_b).then_with(|| id_a.cmp(id_b)));

    let mut evict = Vec::new();
    let mut kept = Vec::new();

    if let Some(ttl) = policy.ttl_secs {
        let cutoff = now - chrono::Duration::seconds(ttl.min(i64::MAX as u64) as i64);
        for (id, updated_at) in finished {
            if updated_at < cutoff {
                evict.push(id.clone());
            } else {
                kept.push(id);
            }
        }
    } else {
        kept = finished.into_iter().map(|(id, _)| id).collect();
    }

    if let Some(max) = policy.max_records {
        let remaining = total - evict.len();
        if remaining > max {
            let excess = remaining - max;
            evict.extend(kept.into_iter().take(excess).cloned());
        }
    }

    evict
}
