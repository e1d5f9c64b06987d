//! Typed mutations: the only way a stored record changes.
//!
//! Every mutation validates first, then writes, then advances `updated_at`
//! and `revision`. A rejected mutation leaves the record untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::record::{
    BomEntry, Component, DelegationRecord, Feasibility, FinalApproval, FinalResponse, Fulfilment,
    Issue, LogEntry, QualityReport, Severity, SubjectInfo, WorkflowRecord,
};
use crate::status::WorkflowStatus;

/// Arguments for a new component. Status is always `completed` on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub material: String,
    pub dimensions: String,
    #[serde(default)]
    pub details: String,
    pub created_by: String,
}

/// Design decisions written by the designer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignUpdate {
    pub feasibility: Feasibility,
    pub fulfilment: Fulfilment,
    pub design_document: String,
    #[serde(default)]
    pub bill_of_materials: Vec<BomEntry>,
    #[serde(default)]
    pub required_roles: Vec<String>,
}

/// A single change to a workflow record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkflowMutation {
    AddComponent(NewComponent),
    ReportIssue {
        reported_by: String,
        severity: Severity,
        description: String,
    },
    ResolveIssue {
        index: usize,
    },
    UpdateStatus {
        status: WorkflowStatus,
    },
    /// Orchestrator-only: force `failed` regardless of the current status.
    ForceFail,
    LogAction {
        agent: String,
        action: String,
        details: String,
    },
    SetSubject(SubjectInfo),
    SetDesign(DesignUpdate),
    SetQualityReport(QualityReport),
    SetPackaging {
        packaging_design: String,
        gift_card_message: String,
    },
    SetImageAsset {
        prompt: String,
        image_ref: Option<String>,
    },
    SetFinalApproval(FinalApproval),
    SetFinalResponse(FinalResponse),
    RecordDelegation(DelegationRecord),
}

impl WorkflowMutation {
    /// Stable operation name, used in logs.
    pub fn op(&self) -> &'static str {
        match self {
            WorkflowMutation::AddComponent(_) => "add_component",
            WorkflowMutation::ReportIssue { .. } => "report_issue",
            WorkflowMutation::ResolveIssue { .. } => "resolve_issue",
            WorkflowMutation::UpdateStatus { .. } => "update_status",
            WorkflowMutation::ForceFail => "force_fail",
            WorkflowMutation::LogAction { .. } => "log_action",
            WorkflowMutation::SetSubject(_) => "set_subject",
            WorkflowMutation::SetDesign(_) => "set_design",
            WorkflowMutation::SetQualityReport(_) => "set_quality_report",
            WorkflowMutation::SetPackaging { .. } => "set_packaging",
            WorkflowMutation::SetImageAsset { .. } => "set_image_asset",
            WorkflowMutation::SetFinalApproval(_) => "set_final_approval",
            WorkflowMutation::SetFinalResponse(_) => "set_final_response",
            WorkflowMutation::RecordDelegation(_) => "record_delegation",
        }
    }
}

/// What a successfully applied mutation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    ComponentAdded {
        id: String,
    },
    IssueReported {
        index: usize,
    },
    StatusChanged {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
}

impl WorkflowRecord {
    /// Apply one mutation at time `now`.
    pub fn apply(
        &mut self,
        mutation: WorkflowMutation,
        now: DateTime<Utc>,
    ) -> Result<MutationOutcome, StateError> {
        let outcome = match mutation {
            WorkflowMutation::AddComponent(c) => {
                if self.has_component(&c.id) {
                    return Err(StateError::DuplicateComponent(c.id));
                }
                let id = c.id.clone();
                self.components.push(Component {
                    id: c.id,
                    component_type: c.component_type,
                    material: c.material,
                    dimensions: c.dimensions,
                    details: c.details,
                    created_by: c.created_by,
                    status: "completed".to_string(),
                    created_at: now,
                });
                MutationOutcome::ComponentAdded { id }
            }
            WorkflowMutation::ReportIssue {
                reported_by,
                severity,
                description,
            } => {
                self.issues.push(Issue {
                    timestamp: now,
                    reported_by,
                    severity,
                    description,
                    resolved: false,
                });
                MutationOutcome::IssueReported {
                    index: self.issues.len() - 1,
                }
            }
            WorkflowMutation::ResolveIssue { index } => {
                let len = self.issues.len();
                let issue = self
                    .issues
                    .get_mut(index)
                    .ok_or(StateError::IssueIndexOutOfRange { index, len })?;
                issue.resolved = true;
                MutationOutcome::Applied
            }
            WorkflowMutation::UpdateStatus { status } => self.transition(status)?,
            WorkflowMutation::ForceFail => {
                let from = self.status;
                self.status = WorkflowStatus::Failed;
                MutationOutcome::StatusChanged {
                    from,
                    to: WorkflowStatus::Failed,
                }
            }
            WorkflowMutation::LogAction {
                agent,
                action,
                details,
            } => {
                self.manufacturing_log.push(LogEntry {
                    timestamp: now,
                    agent,
                    action,
                    details,
                });
                MutationOutcome::Applied
            }
            WorkflowMutation::SetSubject(subject) => {
                self.subject = Some(subject);
                MutationOutcome::Applied
            }
            WorkflowMutation::SetDesign(design) => {
                self.feasibility = design.feasibility;
                self.fulfilment = design.fulfilment;
                self.design_document = design.design_document;
                self.bill_of_materials = design.bill_of_materials;
                self.required_roles = design.required_roles;
                MutationOutcome::Applied
            }
            WorkflowMutation::SetQualityReport(report) => {
                self.quality_report = Some(report);
                MutationOutcome::Applied
            }
            WorkflowMutation::SetPackaging {
                packaging_design,
                gift_card_message,
            } => {
                self.packaging_design = packaging_design;
                self.gift_card_message = gift_card_message;
                MutationOutcome::Applied
            }
            WorkflowMutation::SetImageAsset { prompt, image_ref } => {
                self.image_prompt = prompt;
                self.image_ref = image_ref;
                MutationOutcome::Applied
            }
            WorkflowMutation::SetFinalApproval(approval) => {
                self.final_approval = Some(approval);
                MutationOutcome::Applied
            }
            WorkflowMutation::SetFinalResponse(response) => {
                self.final_response = Some(response);
                MutationOutcome::Applied
            }
            WorkflowMutation::RecordDelegation(entry) => {
                self.delegations.push(entry);
                MutationOutcome::Applied
            }
        };
        self.touch(now);
        Ok(outcome)
    }

    fn transition(&mut self, to: WorkflowStatus) -> Result<MutationOutcome, StateError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(StateError::IllegalTransition { from, to });
        }
        if to == WorkflowStatus::QualityApproved && from != WorkflowStatus::QualityApproved {
            if let Some(index) = self
                .issues
                .iter()
                .position(|i| !i.resolved && i.severity == Severity::High)
            {
                return Err(StateError::UnaddressedHighIssue { index });
            }
        }
        if to == WorkflowStatus::Rework && from != WorkflowStatus::Rework {
            if self.rework_count >= self.rework_limit {
                return Err(StateError::ReworkLimitExceeded {
                    limit: self.rework_limit,
                });
            }
            self.rework_count += 1;
        }
        self.status = to;
        Ok(MutationOutcome::StatusChanged { from, to })
    }
}
