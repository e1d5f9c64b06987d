//! Tool layer.
//!
//! Roles act on the world only through [`ToolCall`]s. A call names either a
//! built-in [`StateTool`] (which mutates or reads the bound record) or an
//! [`ExternalCapability`] registered in the [`CapabilityRegistry`]. The
//! [`ToolLayer`] decodes arguments into typed structs and dispatches.
//!
//! State tool errors are faults. Capability failures and timeouts come back
//! as [`Observation::ToolFailed`] for the role to handle.

pub mod capability;
pub mod state;

use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};
use workshop_state::{
    ApprovalDecision, DesignUpdate, FinalApproval, FinalResponse, NewComponent, QualityReport,
    QualityVerdict, Severity, SubjectInfo, WorkflowStatus,
};

pub use capability::{CapabilityRegistry, ExternalCapability};

use crate::context;
use crate::error::{EngineError, EngineResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::ORCHESTRATOR;
use crate::role_orchestration::roles::{Observation, RoleId};

/// Built-in tools operating on the bound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateTool {
    ReadState,
    AddComponent,
    ReportIssue,
    ResolveIssue,
    UpdateStatus,
    LogAction,
    SetSubjectInfo,
    SetDesign,
    SetQualityReport,
    SetPackaging,
    SetImageAsset,
    SetFinalApproval,
    SetFinalResponse,
}

impl StateTool {
    pub const ALL: [StateTool; 13] = [
        StateTool::ReadState,
        StateTool::AddComponent,
        StateTool::ReportIssue,
        StateTool::ResolveIssue,
        StateTool::UpdateStatus,
        StateTool::LogAction,
        StateTool::SetSubjectInfo,
        StateTool::SetDesign,
        StateTool::SetQualityReport,
        StateTool::SetPackaging,
        StateTool::SetImageAsset,
        StateTool::SetFinalApproval,
        StateTool::SetFinalResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateTool::ReadState => "read_state",
            StateTool::AddComponent => "add_component",
            StateTool::ReportIssue => "report_issue",
            StateTool::ResolveIssue => "resolve_issue",
            StateTool::UpdateStatus => "update_status",
            StateTool::LogAction => "log_action",
            StateTool::SetSubjectInfo => "set_subject_info",
            StateTool::SetDesign => "set_design",
            StateTool::SetQualityReport => "set_quality_report",
            StateTool::SetPackaging => "set_packaging",
            StateTool::SetImageAsset => "set_image_asset",
            StateTool::SetFinalApproval => "set_final_approval",
            StateTool::SetFinalResponse => "set_final_response",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for StateTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn read_state() -> Self {
        Self::new(StateTool::ReadState.as_str(), Value::Null)
    }

    pub fn add_component(component: &NewComponent) -> Self {
        Self::new(StateTool::AddComponent.as_str(), json!(component))
    }

    pub fn report_issue(reported_by: &str, severity: Severity, description: &str) -> Self {
        Self::new(
            StateTool::ReportIssue.as_str(),
            json!({
                "reported_by": reported_by,
                "severity": severity,
                "description": description,
            }),
        )
    }

    pub fn resolve_issue(index: usize) -> Self {
        Self::new(StateTool::ResolveIssue.as_str(), json!({ "index": index }))
    }

    pub fn update_status(status: WorkflowStatus) -> Self {
        Self::new(StateTool::UpdateStatus.as_str(), json!({ "status": status }))
    }

    pub fn log_action(agent: &str, action: &str, details: &str) -> Self {
        Self::new(
            StateTool::LogAction.as_str(),
            json!({ "agent": agent, "action": action, "details": details }),
        )
    }

    pub fn set_subject_info(subject: &SubjectInfo) -> Self {
        Self::new(StateTool::SetSubjectInfo.as_str(), json!(subject))
    }

    pub fn set_design(design: &DesignUpdate) -> Self {
        Self::new(StateTool::SetDesign.as_str(), json!(design))
    }

    pub fn set_quality_report(
        verdict: QualityVerdict,
        components_checked: usize,
        issues_found: &[String],
        safety_approved: bool,
        notes: &str,
    ) -> Self {
        Self::new(
            StateTool::SetQualityReport.as_str(),
            json!({
                "verdict": verdict,
                "components_checked": components_checked,
                "issues_found": issues_found,
                "safety_approved": safety_approved,
                "notes": notes,
            }),
        )
    }

    pub fn set_packaging(packaging_design: &str, gift_card_message: &str) -> Self {
        Self::new(
            StateTool::SetPackaging.as_str(),
            json!({
                "packaging_design": packaging_design,
                "gift_card_message": gift_card_message,
            }),
        )
    }

    pub fn set_image_asset(prompt: &str, image_ref: Option<&str>) -> Self {
        Self::new(
            StateTool::SetImageAsset.as_str(),
            json!({ "prompt": prompt, "image_ref": image_ref }),
        )
    }

    pub fn set_final_approval(decision: ApprovalDecision, blessing: &str, feedback: &str) -> Self {
        Self::new(
            StateTool::SetFinalApproval.as_str(),
            json!({ "decision": decision, "blessing": blessing, "feedback": feedback }),
        )
    }

    pub fn set_final_response(subject: &str, body: &str, delivered: bool) -> Self {
        Self::new(
            StateTool::SetFinalResponse.as_str(),
            json!({ "subject": subject, "body": body, "delivered": delivered }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ReportIssueArgs {
    reported_by: Option<String>,
    severity: Severity,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ResolveIssueArgs {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusArgs {
    status: WorkflowStatus,
}

#[derive(Debug, Deserialize)]
struct LogActionArgs {
    agent: Option<String>,
    action: String,
    #[serde(default)]
    details: String,
}

#[derive(Debug, Deserialize)]
struct QualityReportArgs {
    inspector: Option<String>,
    verdict: QualityVerdict,
    #[serde(default)]
    components_checked: usize,
    #[serde(default)]
    issues_found: Vec<String>,
    safety_approved: bool,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
struct PackagingArgs {
    packaging_design: String,
    #[serde(default)]
    gift_card_message: String,
}

#[derive(Debug, Deserialize)]
struct ImageAssetArgs {
    prompt: String,
    image_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinalApprovalArgs {
    approver: Option<String>,
    decision: ApprovalDecision,
    #[serde(default)]
    blessing: String,
    #[serde(default)]
    feedback: String,
}

fn parse_args<T: DeserializeOwned>(tool: StateTool, args: &Value) -> EngineResult<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(args).map_err(|e| EngineError::InvalidToolArgs {
        tool: tool.as_str().to_string(),
        reason: e.to_string(),
    })
}

/// Name a reporter, agent, inspector or approver field records. Defaults to
/// the calling role; the orchestrator's name is reserved for engine faults.
fn actor(tool: StateTool, given: Option<String>, role: &RoleId) -> EngineResult<String> {
    let name = given.unwrap_or_else(|| role.to_string());
    if name == ORCHESTRATOR {
        return Err(EngineError::InvalidToolArgs {
            tool: tool.as_str().to_string(),
            reason: format!("the name {ORCHESTRATOR} is reserved"),
        });
    }
    Ok(name)
}

/// Run a state tool for `role` against the bound record.
pub fn dispatch_state_tool(tool: StateTool, role: &RoleId, args: &Value) -> EngineResult<Value> {
    let output = match tool {
        StateTool::ReadState => json!(state::read_state()?),
        StateTool::AddComponent => {
            let id = state::add_component(parse_args::<NewComponent>(tool, args)?)?;
            json!({ "component_id": id })
        }
        StateTool::ReportIssue => {
            let a: ReportIssueArgs = parse_args(tool, args)?;
            let reporter = actor(tool, a.reported_by, role)?;
            let index = state::report_issue(&reporter, a.severity, &a.description)?;
            json!({ "issue_index": index })
        }
        StateTool::ResolveIssue => {
            let a: ResolveIssueArgs = parse_args(tool, args)?;
            state::resolve_issue(a.index)?;
            json!({ "resolved": a.index })
        }
        StateTool::UpdateStatus => {
            let a: UpdateStatusArgs = parse_args(tool, args)?;
            json!(state::update_status(a.status)?)
        }
        StateTool::LogAction => {
            let a: LogActionArgs = parse_args(tool, args)?;
            let agent = actor(tool, a.agent, role)?;
            state::log_action(&agent, &a.action, &a.details)?;
            json!({ "logged": true })
        }
        StateTool::SetSubjectInfo => {
            let s: SubjectInfo = parse_args(tool, args)?;
            state::set_subject_info(&s.name, s.age, s.location.as_deref())?;
            json!({ "subject": s.name })
        }
        StateTool::SetDesign => {
            state::set_design(parse_args::<DesignUpdate>(tool, args)?)?;
            json!({ "design": "recorded" })
        }
        StateTool::SetQualityReport => {
            let a: QualityReportArgs = parse_args(tool, args)?;
            let verdict = a.verdict;
            state::set_quality_report(QualityReport {
                inspector: actor(tool, a.inspector, role)?,
                timestamp: Utc::now(),
                verdict,
                components_checked: a.components_checked,
                issues_found: a.issues_found,
                safety_approved: a.safety_approved,
                notes: a.notes,
            })?;
            json!({ "verdict": verdict })
        }
        StateTool::SetPackaging => {
            let a: PackagingArgs = parse_args(tool, args)?;
            state::set_packaging(&a.packaging_design, &a.gift_card_message)?;
            json!({ "packaging": "recorded" })
        }
        StateTool::SetImageAsset => {
            let a: ImageAssetArgs = parse_args(tool, args)?;
            state::set_image_asset(&a.prompt, a.image_ref.as_deref())?;
            json!({ "image_ref": a.image_ref })
        }
        StateTool::SetFinalApproval => {
            let a: FinalApprovalArgs = parse_args(tool, args)?;
            let decision = a.decision;
            state::set_final_approval(FinalApproval {
                approver: actor(tool, a.approver, role)?,
                decision,
                blessing: a.blessing,
                feedback: a.feedback,
                decided_at: Utc::now(),
            })?;
            json!({ "decision": decision })
        }
        StateTool::SetFinalResponse => {
            let r: FinalResponse = parse_args(tool, args)?;
            state::set_final_response(&r.subject, &r.body, r.delivered)?;
            json!({ "delivered": r.delivered })
        }
    };
    Ok(output)
}

/// Dispatcher for state tools and external capabilities.
#[derive(Debug, Clone)]
pub struct ToolLayer {
    capabilities: CapabilityRegistry,
    capability_timeout: Duration,
}

impl Default for ToolLayer {
    fn default() -> Self {
        Self::new(CapabilityRegistry::default(), Duration::from_secs(30))
    }
}

impl ToolLayer {
    pub fn new(capabilities: CapabilityRegistry, capability_timeout: Duration) -> Self {
        Self {
            capabilities,
            capability_timeout,
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Whether `name` is a state tool or a registered capability.
    pub fn knows(&self, name: &str) -> bool {
        StateTool::from_name(name).is_some() || self.capabilities.contains(name)
    }

    /// Run `call` on behalf of `role` within the bound workflow.
    #[instrument(skip(self, call), fields(role = %role, tool = %call.name))]
    pub async fn invoke(&self, role: &RoleId, call: &ToolCall) -> EngineResult<Observation> {
        let workflow_id = context::current_id()?;
        METRICS.inc_tool_calls();

        if let Some(tool) = StateTool::from_name(&call.name) {
            let output = dispatch_state_tool(tool, role, &call.args)?;
            obs::emit_tool_invoked(workflow_id.as_str(), role.as_str(), &call.name, true);
            return Ok(Observation::Tool {
                name: call.name.clone(),
                output,
            });
        }

        let capability = self
            .capabilities
            .get(&call.name)
            .ok_or_else(|| EngineError::UnknownTool(call.name.clone()))?;

        let result =
            tokio::time::timeout(self.capability_timeout, capability.call(&workflow_id, &call.args))
                .await;
        let observation = match result {
            Ok(Ok(output)) => Observation::Tool {
                name: call.name.clone(),
                output,
            },
            Ok(Err(error)) => Observation::ToolFailed {
                name: call.name.clone(),
                error,
            },
            Err(_) => Observation::ToolFailed {
                name: call.name.clone(),
                error: format!(
                    "timed out after {}ms",
                    self.capability_timeout.as_millis()
                ),
            },
        };
        if let Observation::ToolFailed { error, .. } = &observation {
            debug!(error = %error, "capability failed");
        }
        obs::emit_tool_invoked(
            workflow_id.as_str(),
            role.as_str(),
            &call.name,
            !observation.is_failure(),
        );
        Ok(observation)
    }
}
