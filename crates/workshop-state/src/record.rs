//! The workflow record: one document per workflow instance.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::status::WorkflowStatus;
use crate::store::WorkflowId;

/// Who the request is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub name: String,
    pub age: Option<u32>,
    pub location: Option<String>,
}

/// Whether the designer judged the request buildable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    #[default]
    Unknown,
    Feasible,
    Infeasible,
}

/// Production-vs-sourcing choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fulfilment {
    #[default]
    Pending,
    Manufacture,
    Purchase,
}

/// One bill-of-materials line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomEntry {
    pub name: String,
    pub quantity: u32,
    pub material: String,
    #[serde(default)]
    pub specification: String,
}

/// A part produced (or sourced) for the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub material: String,
    pub dimensions: String,
    pub details: String,
    pub created_by: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Manufacturing log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub action: String,
    pub details: String,
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(StateError::UnknownSeverity(s.to_string())),
        }
    }
}

/// A business-level defect reported by a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub timestamp: DateTime<Utc>,
    pub reported_by: String,
    pub severity: Severity,
    pub description: String,
    pub resolved: bool,
}

/// Outcome of a quality inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    Pass,
    Rework,
    Fail,
}

/// Quality inspection report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub inspector: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: QualityVerdict,
    pub components_checked: usize,
    #[serde(default)]
    pub issues_found: Vec<String>,
    pub safety_approved: bool,
    #[serde(default)]
    pub notes: String,
}

/// Final approver decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Final approval record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalApproval {
    pub approver: String,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub blessing: String,
    #[serde(default)]
    pub feedback: String,
    pub decided_at: DateTime<Utc>,
}

impl FinalApproval {
    pub fn approved(&self) -> bool {
        self.decision == ApprovalDecision::Approved
    }
}

/// The reply composed for the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub subject: String,
    pub body: String,
    /// Whether a delivery capability accepted the message.
    #[serde(default)]
    pub delivered: bool,
}

/// Audit entry for one delegation taken during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub from: String,
    pub to: String,
    pub depth: u32,
    /// SHA-256 hex digest of the serialized delegation payload.
    pub payload_digest: String,
    pub timestamp: DateTime<Utc>,
}

/// Shared record for one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,

    pub subject: Option<SubjectInfo>,
    pub request: String,
    pub contact_address: Option<String>,

    pub feasibility: Feasibility,
    pub fulfilment: Fulfilment,
    pub design_document: String,
    pub bill_of_materials: Vec<BomEntry>,
    pub required_roles: Vec<String>,

    pub components: Vec<Component>,
    pub manufacturing_log: Vec<LogEntry>,
    pub issues: Vec<Issue>,

    pub quality_report: Option<QualityReport>,

    pub packaging_design: String,
    pub gift_card_message: String,

    pub image_prompt: String,
    pub image_ref: Option<String>,

    pub final_approval: Option<FinalApproval>,
    pub final_response: Option<FinalResponse>,

    pub delegations: Vec<DelegationRecord>,
    pub rework_count: u32,
    pub rework_limit: u32,
    pub revision: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    /// Fresh record in `received` status.
    pub fn new(
        workflow_id: WorkflowId,
        request: impl Into<String>,
        contact_address: Option<String>,
        rework_limit: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            status: WorkflowStatus::Received,
            subject: None,
            request: request.into(),
            contact_address,
            feasibility: Feasibility::Unknown,
            fulfilment: Fulfilment::Pending,
            design_document: String::new(),
            bill_of_materials: Vec::new(),
            required_roles: Vec::new(),
            components: Vec::new(),
            manufacturing_log: Vec::new(),
            issues: Vec::new(),
            quality_report: None,
            packaging_design: String::new(),
            gift_card_message: String::new(),
            image_prompt: String::new(),
            image_ref: None,
            final_approval: None,
            final_response: None,
            delegations: Vec::new(),
            rework_count: 0,
            rework_limit,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Indices and issues not yet resolved.
    pub fn open_issues(&self) -> impl Iterator<Item = (usize, &Issue)> {
        self.issues.iter().enumerate().filter(|(_, i)| !i.resolved)
    }

    /// Open issues at or above `severity`.
    pub fn open_issues_at_least(&self, severity: Severity) -> Vec<(usize, &Issue)> {
        self.open_issues()
            .filter(|(_, issue)| issue.severity >= severity)
            .collect()
    }

    pub fn has_component(&self, id: &str) -> bool {
        self.components.iter().any(|c| c.id == id)
    }

    /// Serialize the full record into a digest-stamped snapshot.
    pub fn snapshot(&self) -> Result<StateSnapshot, StateError> {
        StateSnapshot::of(self)
    }

    /// Short human-readable summary.
    pub fn summary(&self) -> String {
        let subject = self
            .subject
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("unknown");
        let request: String = self.request.chars().take(100).collect();
        let ellipsis = if self.request.chars().count() > 100 {
            "..."
        } else {
            ""
        };
        format!(
            "Workflow: {}\nStatus: {}\nSubject: {}\nRequest: {}{}\nComponents: {}\nFulfilment: {:?}\nIssues: {} unresolved\n",
            self.workflow_id,
            self.status,
            subject,
            request,
            ellipsis,
            self.components.len(),
            self.fulfilment,
            self.open_issues().count(),
        )
    }

    /// Advance `updated_at` without ever moving it backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.revision += 1;
    }
}

/// Serialized, digest-stamped view of a record.
///
/// Two snapshots of an unmodified record are byte-identical, so equal digests
/// mean "nothing changed in between".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub workflow_id: WorkflowId,
    pub revision: u64,
    pub json: String,
    /// SHA-256 hex digest of `json`.
    pub digest: String,
}

impl StateSnapshot {
    pub fn of(record: &WorkflowRecord) -> Result<Self, StateError> {
        use sha2::Digest as _;
        let json = serde_json::to_string_pretty(record)?;
        let digest = hex::encode(sha2::Sha256::digest(json.as_bytes()));
        Ok(Self {
            workflow_id: record.workflow_id.clone(),
            revision: record.revision,
            json,
            digest,
        })
    }

    /// Parse the snapshot back into a record.
    pub fn record(&self) -> Result<WorkflowRecord, StateError> {
        Ok(serde_json::from_str(&self.json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WorkflowRecord {
        WorkflowRecord::new(WorkflowId::from("WF-TEST"), "a wooden train", None, 2)
    }

    #[test]
    fn test_new_record_starts_received() {
        let r = record();
        assert_eq!(r.status, WorkflowStatus::Received);
        assert_eq!(r.revision, 0);
        assert_eq!(r.created_at, r.updated_at);
        assert!(r.components.is_empty());
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut r = record();
        let before = r.updated_at;
        r.touch(before - chrono::Duration::seconds(30));
        assert_eq!(r.updated_at, before);
        assert_eq!(r.revision, 1);
    }

    #[test]
    fn test_snapshot_digest_is_stable_for_unchanged_record() {
        let r = record();
        let a = r.snapshot().unwrap();
        let b = r.snapshot().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest.len(), 64);
        assert_eq!(a.record().unwrap(), r);
    }

    #[test]
    fn test_component_serializes_type_field() {
        let c = Component {
            id: "wheel-1".into(),
            component_type: "wheel".into(),
            material: "rubber".into(),
            dimensions: "3cm".into(),
            details: String::new(),
            created_by: "mechanic_elf".into(),
            status: "completed".into(),
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "wheel");
    }

    #[test]
    fn test_severity_parse_and_order() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_summary_truncates_long_requests() {
        let r = WorkflowRecord::new(WorkflowId::from("WF-LONG"), "x".repeat(250), None, 1);
        let s = r.summary();
        assert!(s.contains("..."));
        assert!(s.contains("Status: received"));
    }
}
