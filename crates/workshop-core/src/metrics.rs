//! Global atomic counters for workflow observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    workflows_started: AtomicU64,
    workflows_completed: AtomicU64,
    workflows_failed: AtomicU64,
    admissions_rejected: AtomicU64,
    delegations: AtomicU64,
    tool_calls: AtomicU64,
    rework_cycles: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            workflows_started: AtomicU64::new(0),
            workflows_completed: AtomicU64::new(0),
            workflows_failed: AtomicU64::new(0),
            admissions_rejected: AtomicU64::new(0),
            delegations: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            rework_cycles: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_workflows_started(&self) {
        Self::bump(&self.workflows_started, "workflows_started");
    }

    pub fn inc_workflows_completed(&self) {
        Self::bump(&self.workflows_completed, "workflows_completed");
    }

    pub fn inc_workflows_failed(&self) {
        Self::bump(&self.workflows_failed, "workflows_failed");
    }

    pub fn inc_admissions_rejected(&self) {
        Self::bump(&self.admissions_rejected, "admissions_rejected");
    }

    pub fn inc_delegations(&self) {
        Self::bump(&self.delegations, "delegations");
    }

    pub fn inc_tool_calls(&self) {
        Self::bump(&self.tool_calls, "tool_calls");
    }

    pub fn inc_rework_cycles(&self) {
        Self::bump(&self.rework_cycles, "rework_cycles");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a workflow, CLI exit) rather than on
    /// every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            workflows_started = self.workflows_started(),
            workflows_completed = self.workflows_completed(),
            workflows_failed = self.workflows_failed(),
            admissions_rejected = self.admissions_rejected(),
            delegations = self.delegations(),
            tool_calls = self.tool_calls(),
            rework_cycles = self.rework_cycles(),
        );
    }

    pub fn workflows_started(&self) -> u64 {
        self.workflows_started.load(Ordering::Relaxed)
    }

    pub fn workflows_completed(&self) -> u64 {
        self.workflows_completed.load(Ordering::Relaxed)
    }

    pub fn workflows_failed(&self) -> u64 {
        self.workflows_failed.load(Ordering::Relaxed)
    }

    pub fn admissions_rejected(&self) -> u64 {
        self.admissions_rejected.load(Ordering::Relaxed)
    }

    pub fn delegations(&self) -> u64 {
        self.delegations.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn rework_cycles(&self) -> u64 {
        self.rework_cycles.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.workflows_started,
            &self.workflows_completed,
            &self.workflows_failed,
            &self.admissions_rejected,
            &self.delegations,
            &self.tool_calls,
            &self.rework_cycles,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
