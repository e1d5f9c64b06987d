//! Support roles: image prompts, final approval, the response and online sourcing.
//!
//! Each role here may lean on an optional external capability. When the
//! capability is not wired in, the role skips that step; when it is wired in
//! and fails, the role records the failure and carries on.

use serde_json::{json, Value};
use workshop_state::{
    ApprovalDecision, NewComponent, QualityVerdict, Severity, WorkflowRecord, WorkflowStatus,
};

use crate::role_orchestration::roles::{Decision, Observation, RoleSpec, RoleTask, ScriptedPolicy};
use crate::tools::{StateTool, ToolCall};
use crate::workshop::artisans::next_component_id;
use crate::workshop::managers::gift_of;
use crate::workshop::{
    intake, FINAL_APPROVER, GENERATE_IMAGE, IMAGE_PROMPT, ONLINE_SHOPPER, QUALITY,
    RESPONSE_COMPOSER, SEND_EMAIL, WEB_SEARCH,
};

fn status(s: WorkflowStatus) -> Decision {
    Decision::tool(ToolCall::update_status(s))
}

fn log(role: &str, action: &str, details: &str) -> Decision {
    Decision::tool(ToolCall::log_action(role, action, details))
}

fn gift_name(record: &WorkflowRecord) -> String {
    intake::read_request(&record.request).gift
}

fn child_name(record: &WorkflowRecord) -> String {
    record
        .subject
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "friend".into())
}

/// Text prompt describing the finished gift.
pub fn image_prompt(record: &WorkflowRecord) -> String {
    let parts = record
        .components
        .iter()
        .map(|c| format!("{} ({})", c.component_type.replace('_', " "), c.material))
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = format!(
        "A festive product photo of {}, lit warmly on a workbench in Santa's workshop",
        gift_name(record)
    );
    if !parts.is_empty() {
        prompt.push_str(&format!(", showing {parts}"));
    }
    if !record.packaging_design.is_empty() {
        prompt.push_str(&format!(". Packaging: {}", record.packaging_design));
    }
    prompt
}

/// Reference to a generated asset: `output.image_ref`, or the output itself
/// when it is a bare string.
fn image_ref_of(observation: Option<&Observation>) -> Option<String> {
    match observation? {
        Observation::Tool { output, .. } => output
            .get("image_ref")
            .and_then(Value::as_str)
            .or_else(|| output.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn failure_of(observation: Option<&Observation>) -> Option<&str> {
    match observation? {
        Observation::ToolFailed { error, .. } => Some(error),
        _ => None,
    }
}

fn image_script(generate: bool, task: &RoleTask) -> Vec<Decision> {
    let prompt = image_prompt(&task.entry);
    let mut script = Vec::new();
    let mut image_ref = None;

    if generate {
        script.push(Decision::tool(ToolCall::new(
            GENERATE_IMAGE,
            json!({ "prompt": prompt }),
        )));
        let generated = task.observation(0);
        image_ref = image_ref_of(generated);
        if let Some(error) = failure_of(generated) {
            script.push(log(
                IMAGE_PROMPT,
                "image generation failed",
                &format!("Continuing without an image: {error}"),
            ));
        }
    }

    script.extend([
        Decision::tool(ToolCall::set_image_asset(&prompt, image_ref.as_deref())),
        log(IMAGE_PROMPT, "prompt written", &prompt),
        status(WorkflowStatus::FinalReview),
        Decision::delegate(FINAL_APPROVER, json!({})),
        Decision::finish(json!({ "stage": "image", "image_ref": image_ref })),
    ]);
    script
}

pub fn image_prompt_generator(generate: bool) -> RoleSpec {
    let mut tools = vec![
        StateTool::ReadState.as_str(),
        StateTool::SetImageAsset.as_str(),
        StateTool::UpdateStatus.as_str(),
        StateTool::LogAction.as_str(),
    ];
    if generate {
        tools.push(GENERATE_IMAGE);
    }
    RoleSpec::new(
        IMAGE_PROMPT,
        ScriptedPolicy::new(move |task| Ok(image_script(generate, task))),
    )
    .describe("Describes the finished gift and optionally renders a picture")
    .with_tools(tools)
    .delegating_to([FINAL_APPROVER])
}

/// Why the final approver would refuse `record`, if it would.
pub fn refusal(record: &WorkflowRecord) -> Option<String> {
    let report = match &record.quality_report {
        None => return Some("no quality report on file".into()),
        Some(r) => r,
    };
    match report.verdict {
        QualityVerdict::Pass if report.safety_approved => {}
        QualityVerdict::Pass => return Some("safety was not signed off".into()),
        QualityVerdict::Rework => return Some("quality inspection asked for rework".into()),
        QualityVerdict::Fail => return Some("quality inspection failed".into()),
    }
    let open_high = record.open_issues_at_least(Severity::High);
    if !open_high.is_empty() {
        return Some(format!("{} high-severity issues remain open", open_high.len()));
    }
    if record.components.is_empty() {
        return Some("nothing was produced".into());
    }
    None
}

fn approval_script(task: &RoleTask) -> Vec<Decision> {
    let entry = &task.entry;
    let name = child_name(entry);
    let mut script = vec![Decision::tool(ToolCall::read_state())];

    match refusal(entry) {
        None => script.extend([
            Decision::tool(ToolCall::set_final_approval(
                ApprovalDecision::Approved,
                &format!("Ho ho ho! May this gift bring you joy, {name}."),
                "Crafted with care and passed inspection.",
            )),
            status(WorkflowStatus::FinalApproved),
        ]),
        Some(reason) => script.extend([
            Decision::tool(ToolCall::set_final_approval(
                ApprovalDecision::Rejected,
                "",
                &format!("Not ready for delivery: {reason}"),
            )),
            status(WorkflowStatus::Failed),
        ]),
    }
    script.push(Decision::delegate(RESPONSE_COMPOSER, json!({})));
    script.push(Decision::finish(json!({ "stage": "final_approval" })));
    script
}

pub fn santa_claus() -> RoleSpec {
    RoleSpec::new(
        FINAL_APPROVER,
        ScriptedPolicy::new(|task| Ok(approval_script(task))),
    )
    .describe("Gives the final approval and blessing")
    .with_tools([
        StateTool::ReadState.as_str(),
        StateTool::SetFinalApproval.as_str(),
        StateTool::UpdateStatus.as_str(),
    ])
    .delegating_to([RESPONSE_COMPOSER])
}

/// Subject and body of the letter back to the requester.
pub fn compose(record: &WorkflowRecord) -> (String, String) {
    let name = child_name(record);
    let gift = gift_name(record);
    let approval = record.final_approval.as_ref();

    if approval.is_some_and(|a| a.approved()) {
        let makers = record
            .components
            .iter()
            .map(|c| c.created_by.as_str())
            .fold(Vec::new(), |mut acc, who| {
                if !acc.contains(&who) {
                    acc.push(who);
                }
                acc
            })
            .join(", ");
        let blessing = approval.map(|a| a.blessing.as_str()).unwrap_or_default();
        let subject = format!("Your special gift is ready, {name}!");
        let mut body = format!("Dear {name},\n\nYour wish for {gift} came true.");
        if !makers.is_empty() {
            body.push_str(&format!(" It was made with care by {makers}."));
        }
        body.push_str(" It passed our quality and safety inspection.");
        if !record.gift_card_message.is_empty() {
            body.push_str(&format!("\n\n{}", record.gift_card_message));
        }
        if !blessing.is_empty() {
            body.push_str(&format!("\n\n{blessing}"));
        }
        body.push_str("\n\nMerry Christmas,\nSanta Claus and the Workshop Elves");
        (subject, body)
    } else {
        let reason = approval
            .map(|a| a.feedback.clone())
            .unwrap_or_else(|| "the workshop could not finish it".into());
        (
            format!("News from Santa's workshop, {name}"),
            format!(
                "Dear {name},\n\nWe tried hard to prepare {gift}, but it is not ready: {reason}\n\nWarm wishes,\nSanta Claus and the Workshop Elves"
            ),
        )
    }
}

fn response_script(email: bool, task: &RoleTask) -> Vec<Decision> {
    let entry = &task.entry;
    let (subject, body) = compose(entry);
    let mut script = vec![Decision::tool(ToolCall::read_state())];
    let mut delivered = false;

    match (email, entry.contact_address.as_deref()) {
        (true, Some(to)) => {
            script.push(Decision::tool(ToolCall::new(
                SEND_EMAIL,
                json!({ "to": to, "subject": subject, "body": body, "image_ref": entry.image_ref }),
            )));
            let sent = task.observation(1);
            delivered = matches!(sent, Some(Observation::Tool { .. }));
            if let Some(error) = failure_of(sent) {
                script.push(log(RESPONSE_COMPOSER, "delivery failed", error));
            }
        }
        (_, None) => script.push(log(
            RESPONSE_COMPOSER,
            "delivery skipped",
            "No contact address on file",
        )),
        (false, Some(_)) => {}
    }

    script.push(Decision::tool(ToolCall::set_final_response(
        &subject, &body, delivered,
    )));
    script.push(log(RESPONSE_COMPOSER, "response composed", &subject));
    if entry.status == WorkflowStatus::FinalApproved {
        script.push(status(WorkflowStatus::Completed));
    }
    script.push(Decision::finish(
        json!({ "stage": "response", "delivered": delivered }),
    ));
    script
}

pub fn response_composer(email: bool) -> RoleSpec {
    let mut tools = vec![
        StateTool::ReadState.as_str(),
        StateTool::SetFinalResponse.as_str(),
        StateTool::UpdateStatus.as_str(),
        StateTool::LogAction.as_str(),
    ];
    if email {
        tools.push(SEND_EMAIL);
    }
    RoleSpec::new(
        RESPONSE_COMPOSER,
        ScriptedPolicy::new(move |task| Ok(response_script(email, task))),
    )
    .describe("Writes the letter back and closes the workflow")
    .with_tools(tools)
}

fn shopping_script(search: bool, task: &RoleTask) -> Vec<Decision> {
    let item = task
        .payload
        .get("item")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| gift_of(task));
    let mut script = vec![status(WorkflowStatus::Sourcing)];
    let mut details = format!("Sourced {item} from a trusted retailer");

    if search {
        script.push(Decision::tool(ToolCall::new(
            WEB_SEARCH,
            json!({ "query": format!("buy {item} for a child") }),
        )));
        match task.observation(1) {
            Some(Observation::Tool { output, .. }) => {
                let found = output
                    .get("title")
                    .and_then(Value::as_str)
                    .or_else(|| output.as_str())
                    .unwrap_or("top search result");
                details = format!("Sourced {item}: {found}");
            }
            Some(Observation::ToolFailed { error, .. }) => {
                script.push(log(ONLINE_SHOPPER, "search failed", error));
            }
            _ => {}
        }
    }

    let id = next_component_id(&task.entry, "purchased_item");
    script.extend([
        Decision::tool(ToolCall::add_component(&NewComponent {
            id: id.clone(),
            component_type: "purchased_item".into(),
            material: "retail".into(),
            dimensions: "as sold".into(),
            details,
            created_by: ONLINE_SHOPPER.into(),
        })),
        log(ONLINE_SHOPPER, "purchased", &format!("Ordered {item} as {id}")),
        status(WorkflowStatus::QualityReview),
        Decision::delegate(QUALITY, json!({})),
        Decision::finish(json!({ "stage": "sourcing", "component_id": id })),
    ]);
    script
}

pub fn online_shopper(search: bool) -> RoleSpec {
    let mut tools = vec![
        StateTool::ReadState.as_str(),
        StateTool::AddComponent.as_str(),
        StateTool::UpdateStatus.as_str(),
        StateTool::LogAction.as_str(),
    ];
    if search {
        tools.push(WEB_SEARCH);
    }
    RoleSpec::new(
        ONLINE_SHOPPER,
        ScriptedPolicy::new(move |task| Ok(shopping_script(search, task))),
    )
    .describe("Buys ready-made gifts instead of building them")
    .with_tools(tools)
    .delegating_to([QUALITY])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role_orchestration::roles::Turn;
    use workshop_state::{WorkflowId, WorkflowMutation};

    fn task(record: WorkflowRecord) -> RoleTask {
        RoleTask {
            role: FINAL_APPROVER.into(),
            payload: json!({}),
            depth: 8,
            entry: record,
            transcript: Vec::new(),
        }
    }

    fn with_component(mut record: WorkflowRecord) -> WorkflowRecord {
        record
            .apply(
                WorkflowMutation::AddComponent(NewComponent {
                    id: "teddy-1".into(),
                    component_type: "fabric_cover".into(),
                    material: "cotton".into(),
                    dimensions: "30cm".into(),
                    details: String::new(),
                    created_by: "fabric_elf".into(),
                }),
                chrono::Utc::now(),
            )
            .unwrap();
        record
    }

    #[test]
    fn test_refusal_without_quality_report() {
        let record = with_component(WorkflowRecord::new(
            WorkflowId::from("WF-S"),
            "a teddy bear",
            None,
            1,
        ));
        assert!(refusal(&record).unwrap().contains("quality"));
        let script = approval_script(&task(record));
        assert!(script.contains(&status(WorkflowStatus::Failed)));
        assert!(script
            .iter()
            .any(|d| matches!(d, Decision::Delegate { to, .. } if to.as_str() == RESPONSE_COMPOSER)));
    }

    #[test]
    fn test_image_ref_read_from_capability_output() {
        let obs = Observation::Tool {
            name: GENERATE_IMAGE.into(),
            output: json!({ "image_ref": "file:///tmp/gift.png" }),
        };
        assert_eq!(image_ref_of(Some(&obs)).as_deref(), Some("file:///tmp/gift.png"));
        let bare = Observation::Tool {
            name: GENERATE_IMAGE.into(),
            output: json!("s3://gifts/1.png"),
        };
        assert_eq!(image_ref_of(Some(&bare)).as_deref(), Some("s3://gifts/1.png"));
    }

    #[test]
    fn test_failed_email_is_not_delivered() {
        let mut record = WorkflowRecord::new(
            WorkflowId::from("WF-E"),
            "a teddy bear",
            Some("kid@example.com".into()),
            1,
        );
        record.status = WorkflowStatus::FinalApproved;
        let mut t = task(record);
        let send = response_script(true, &t)[1].clone();
        t.transcript = vec![
            Turn {
                decision: Decision::tool(ToolCall::read_state()),
                observation: Observation::Tool {
                    name: "read_state".into(),
                    output: Value::Null,
                },
            },
            Turn {
                decision: send,
                observation: Observation::ToolFailed {
                    name: SEND_EMAIL.into(),
                    error: "smtp down".into(),
                },
            },
        ];
        let script = response_script(true, &t);
        assert!(script.contains(&log(RESPONSE_COMPOSER, "delivery failed", "smtp down")));
        assert!(script.iter().any(|d| matches!(
            d,
            Decision::InvokeTool(call)
                if call.name == "set_final_response" && call.args["delivered"] == false
        )));
        assert!(script.contains(&status(WorkflowStatus::Completed)));
    }

    #[test]
    fn test_compose_mentions_makers() {
        let mut record = with_component(WorkflowRecord::new(
            WorkflowId::from("WF-C"),
            "Child Ada wants a teddy bear",
            None,
            1,
        ));
        record.final_approval = Some(workshop_state::FinalApproval {
            approver: FINAL_APPROVER.into(),
            decision: ApprovalDecision::Approved,
            blessing: "Ho ho ho".into(),
            feedback: String::new(),
            decided_at: chrono::Utc::now(),
        });
        let (subject, body) = compose(&record);
        assert_eq!(subject, "Your special gift is ready, friend!");
        assert!(body.contains("a teddy bear"));
        assert!(body.contains("fabric_elf"));
        assert!(body.contains("Ho ho ho"));
    }
}
