//! State tools: the only mutation points roles have on a record.
//!
//! Every function resolves the record through the task's workflow binding and
//! fails with `NoActiveWorkflow` when nothing is bound. Calls are not
//! deduplicated; issuing one twice appends twice.

use workshop_state::{
    DesignUpdate, FinalApproval, FinalResponse, MutationOutcome, NewComponent, QualityReport,
    Severity, StateSnapshot, SubjectInfo, WorkflowMutation, WorkflowStatus,
};

use crate::context;
use crate::error::EngineResult;
use crate::metrics::METRICS;
use crate::obs;

/// Serialized, digest-stamped snapshot of the bound record.
pub fn read_state() -> EngineResult<StateSnapshot> {
    let binding = context::current()?;
    Ok(binding.record()?.snapshot()?)
}

/// Append a component (status `completed`). Returns its id.
pub fn add_component(component: NewComponent) -> EngineResult<String> {
    let binding = context::current()?;
    let id = component.id.clone();
    binding.apply(WorkflowMutation::AddComponent(component))?;
    Ok(id)
}

/// Append an unresolved issue. Returns its index in the issue list.
pub fn report_issue(
    reported_by: &str,
    severity: Severity,
    description: &str,
) -> EngineResult<usize> {
    let binding = context::current()?;
    let outcome = binding.apply(WorkflowMutation::ReportIssue {
        reported_by: reported_by.to_string(),
        severity,
        description: description.to_string(),
    })?;
    let index = match outcome {
        MutationOutcome::IssueReported { index } => index,
        _ => binding.record()?.issues.len().saturating_sub(1),
    };
    obs::emit_issue_reported(binding.workflow_id().as_str(), reported_by, severity, index);
    Ok(index)
}

/// Mark issue `index` resolved.
pub fn resolve_issue(index: usize) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::ResolveIssue { index })?;
    Ok(())
}

/// Move the record to `status`, validated against the status machine.
pub fn update_status(status: WorkflowStatus) -> EngineResult<MutationOutcome> {
    let binding = context::current()?;
    let outcome = binding.apply(WorkflowMutation::UpdateStatus { status })?;
    if let MutationOutcome::StatusChanged { from, to } = outcome {
        if from != to {
            obs::emit_status_changed(binding.workflow_id().as_str(), from, to);
            if to == WorkflowStatus::Rework {
                METRICS.inc_rework_cycles();
            }
        }
    }
    Ok(outcome)
}

pub fn log_action(agent: &str, action: &str, details: &str) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::LogAction {
        agent: agent.to_string(),
        action: action.to_string(),
        details: details.to_string(),
    })?;
    Ok(())
}

/// Replace the subject metadata. Not additive: absent fields are cleared.
pub fn set_subject_info(
    name: &str,
    age: Option<u32>,
    location: Option<&str>,
) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetSubject(SubjectInfo {
        name: name.to_string(),
        age,
        location: location.map(str::to_string),
    }))?;
    Ok(())
}

pub fn set_design(design: DesignUpdate) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetDesign(design))?;
    Ok(())
}

pub fn set_quality_report(report: QualityReport) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetQualityReport(report))?;
    Ok(())
}

pub fn set_packaging(packaging_design: &str, gift_card_message: &str) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetPackaging {
        packaging_design: packaging_design.to_string(),
        gift_card_message: gift_card_message.to_string(),
    })?;
    Ok(())
}

pub fn set_image_asset(prompt: &str, image_ref: Option<&str>) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetImageAsset {
        prompt: prompt.to_string(),
        image_ref: image_ref.map(str::to_string),
    })?;
    Ok(())
}

pub fn set_final_approval(approval: FinalApproval) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetFinalApproval(approval))?;
    Ok(())
}

pub fn set_final_response(subject: &str, body: &str, delivered: bool) -> EngineResult<()> {
    context::current()?.apply(WorkflowMutation::SetFinalResponse(FinalResponse {
        subject: subject.to_string(),
        body: body.to_string(),
        delivered,
    }))?;
    Ok(())
}
