//! Structured observability hooks for workflow lifecycle events.
//!
//! This module provides:
//! - Workflow-scoped tracing spans via the `WorkflowSpan` RAII guard
//! - Emission functions for role entry/return, delegation, tool calls, status
//!   changes, issues and faults
//!
//! Events are emitted at `info!` level (faults at `warn!`). Filter with
//! `RUST_LOG`; JSON output is selected through `telemetry::init_tracing`.

use tracing::info;
use workshop_state::{Severity, WorkflowStatus};

/// RAII guard that enters a workflow-scoped span.
///
/// # Example
///
/// ```ignore
/// let _span = WorkflowSpan::enter("WF-20261019-...");
/// // tracing calls on this thread now carry workflow_id
/// ```
pub struct WorkflowSpan {
    _span: tracing::span::EnteredSpan,
}

impl WorkflowSpan {
    pub fn enter(workflow_id: &str) -> Self {
        Self {
            _span: span(workflow_id).entered(),
        }
    }
}

/// The workflow span, for instrumenting futures that cross await points.
pub fn span(workflow_id: &str) -> tracing::Span {
    tracing::info_span!("workshop.workflow", workflow_id = %workflow_id)
}

pub fn emit_workflow_started(workflow_id: &str, request_len: usize) {
    info!(event = "workflow.started", workflow_id = %workflow_id, request_len = request_len);
}

/// Emit event: workflow finished with its final status.
pub fn emit_workflow_finished(
    workflow_id: &str,
    status: WorkflowStatus,
    duration_ms: u64,
    issues: usize,
) {
    info!(
        event = "workflow.finished",
        workflow_id = %workflow_id,
        status = %status,
        duration_ms = duration_ms,
        issues = issues,
    );
}

pub fn emit_role_entered(workflow_id: &str, role: &str, depth: u32) {
    info!(event = "role.entered", workflow_id = %workflow_id, role = %role, depth = depth);
}

pub fn emit_role_returned(workflow_id: &str, role: &str, depth: u32, turns: usize) {
    info!(
        event = "role.returned",
        workflow_id = %workflow_id,
        role = %role,
        depth = depth,
        turns = turns,
    );
}

pub fn emit_delegation(workflow_id: &str, from: &str, to: &str, depth: u32) {
    info!(event = "delegation", workflow_id = %workflow_id, from = %from, to = %to, depth = depth);
}

pub fn emit_tool_invoked(workflow_id: &str, role: &str, tool: &str, ok: bool) {
    info!(event = "tool.invoked", workflow_id = %workflow_id, role = %role, tool = %tool, ok = ok);
}

pub fn emit_status_changed(workflow_id: &str, from: WorkflowStatus, to: WorkflowStatus) {
    info!(event = "status.changed", workflow_id = %workflow_id, from = %from, to = %to);
}

pub fn emit_issue_reported(workflow_id: &str, reported_by: &str, severity: Severity, index: usize) {
    info!(
        event = "issue.reported",
        workflow_id = %workflow_id,
        reported_by = %reported_by,
        severity = %severity,
        index = index,
    );
}

/// Emit event: a fault ended the workflow (warning level).
pub fn emit_workflow_fault(workflow_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "workflow.fault", workflow_id = %workflow_id, error = %error);
}
