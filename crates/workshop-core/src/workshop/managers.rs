//! Manager roles: reception, design, production, quality and logistics.

use serde_json::{json, Value};
use workshop_state::{Feasibility, Fulfilment, QualityVerdict, Severity, WorkflowStatus};

use crate::role_orchestration::roles::{Decision, RoleSpec, RoleTask, ScriptedPolicy};
use crate::tools::{StateTool, ToolCall};
use crate::workshop::artisans::{self, TRADES};
use crate::workshop::intake;
use crate::workshop::{
    DESIGN, IMAGE_PROMPT, LOGISTICS, ONLINE_SHOPPER, PRODUCTION, QUALITY, RECEPTION,
};

fn tools<const N: usize>(list: [StateTool; N]) -> [&'static str; N] {
    list.map(StateTool::as_str)
}

fn status(s: WorkflowStatus) -> Decision {
    Decision::tool(ToolCall::update_status(s))
}

fn log(role: &str, action: &str, details: &str) -> Decision {
    Decision::tool(ToolCall::log_action(role, action, details))
}

/// The gift under discussion: from the payload, else re-read from the request.
pub(crate) fn gift_of(task: &RoleTask) -> String {
    task.payload
        .get("gift")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| intake::read_request(&task.entry.request).gift)
}

fn reception_script(task: &RoleTask) -> Vec<Decision> {
    let request = task
        .payload
        .get("request")
        .and_then(Value::as_str)
        .unwrap_or(task.entry.request.as_str());
    let intake = intake::read_request(request);
    let who = intake
        .subject
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "an unnamed requester".into());

    let mut script = vec![Decision::tool(ToolCall::read_state())];
    if let Some(subject) = &intake.subject {
        script.push(Decision::tool(ToolCall::set_subject_info(subject)));
    }
    script.push(log(
        RECEPTION,
        "intake",
        &format!("Request from {who}: {}", intake.gift),
    ));
    script.push(Decision::delegate(DESIGN, json!({ "gift": intake.gift })));
    script.push(Decision::finish(json!({ "stage": "reception", "gift": intake.gift })));
    script
}

pub fn reception() -> RoleSpec {
    RoleSpec::new(RECEPTION, ScriptedPolicy::new(|task| Ok(reception_script(task))))
        .describe("Reads incoming requests and records who is asking for what")
        .with_tools(tools([
            StateTool::ReadState,
            StateTool::SetSubjectInfo,
            StateTool::LogAction,
        ]))
        .delegating_to([DESIGN])
}

fn design_script(task: &RoleTask) -> Vec<Decision> {
    let gift = gift_of(task);
    let design = intake::plan_design(&gift);
    let color = intake::color_of(&gift);

    let mut script = vec![
        Decision::tool(ToolCall::read_state()),
        Decision::tool(ToolCall::set_design(&design)),
        status(WorkflowStatus::Designed),
    ];
    match (design.feasibility, design.fulfilment) {
        (Feasibility::Infeasible, _) => {
            script.push(log(DESIGN, "rejected", &design.design_document));
            script.push(status(WorkflowStatus::Failed));
        }
        (_, Fulfilment::Purchase) => {
            script.push(log(DESIGN, "sourcing", &design.design_document));
            script.push(Decision::delegate(ONLINE_SHOPPER, json!({ "gift": gift })));
        }
        _ => {
            script.push(log(
                DESIGN,
                "blueprint",
                &format!("Crew: {}", design.required_roles.join(", ")),
            ));
            script.push(Decision::delegate(
                PRODUCTION,
                json!({ "gift": gift, "color": color }),
            ));
        }
    }
    script.push(Decision::finish(json!({ "stage": "design" })));
    script
}

pub fn design() -> RoleSpec {
    RoleSpec::new(DESIGN, ScriptedPolicy::new(|task| Ok(design_script(task))))
        .describe("Decides feasibility, build-or-buy and the artisan crew")
        .with_tools(tools([
            StateTool::ReadState,
            StateTool::SetDesign,
            StateTool::UpdateStatus,
            StateTool::LogAction,
        ]))
        .delegating_to([PRODUCTION, ONLINE_SHOPPER])
}

fn production_script(task: &RoleTask) -> Vec<Decision> {
    let entry = &task.entry;
    let gift = gift_of(task);
    let color = intake::color_of(&gift);
    let mut script = vec![status(WorkflowStatus::InProduction)];

    let crew: Vec<String> = if task.is_rework() {
        let indices: Vec<usize> = task
            .payload
            .get("issues")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|i| usize::try_from(i).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut crew = Vec::new();
        for index in indices {
            let Some(issue) = entry.issues.get(index) else {
                continue;
            };
            script.push(Decision::tool(ToolCall::resolve_issue(index)));
            script.push(log(
                PRODUCTION,
                "rework",
                &format!("Resolved issue #{index}: {}", issue.description),
            ));
            if artisans::trade(&issue.reported_by).is_some() && !crew.contains(&issue.reported_by)
            {
                crew.push(issue.reported_by.clone());
            }
        }
        if crew.is_empty() {
            crew = entry.required_roles.clone();
        }
        crew
    } else {
        script.push(log(
            PRODUCTION,
            "production started",
            &format!("Crew: {}", entry.required_roles.join(", ")),
        ));
        entry.required_roles.clone()
    };

    for role in &crew {
        script.push(Decision::delegate(
            role.as_str(),
            json!({ "gift": gift, "color": color, "rework": task.is_rework() }),
        ));
    }
    script.push(status(WorkflowStatus::QualityReview));
    script.push(Decision::delegate(
        QUALITY,
        json!({ "rework_round": entry.rework_count }),
    ));
    script.push(Decision::finish(json!({ "stage": "production", "crew": crew })));
    script
}

pub fn production() -> RoleSpec {
    RoleSpec::new(
        PRODUCTION,
        ScriptedPolicy::new(|task| Ok(production_script(task))),
    )
    .describe("Coordinates the artisans and handles rework")
    .with_tools(tools([
        StateTool::ReadState,
        StateTool::UpdateStatus,
        StateTool::LogAction,
        StateTool::ResolveIssue,
    ]))
    .delegating_to(TRADES.iter().map(|t| t.role).chain([QUALITY]))
}

fn quality_script(task: &RoleTask) -> Vec<Decision> {
    let entry = &task.entry;
    let checked = entry.components.len();
    let open_high = entry.open_issues_at_least(Severity::High);
    let noted: Vec<String> = entry
        .open_issues()
        .map(|(i, issue)| format!("#{i} [{}] {}", issue.severity, issue.description))
        .collect();
    let mut script = vec![Decision::tool(ToolCall::read_state())];

    if checked == 0 {
        let notes = "No components were produced";
        script.extend([
            Decision::tool(ToolCall::report_issue(QUALITY, Severity::High, notes)),
            Decision::tool(ToolCall::set_quality_report(
                QualityVerdict::Fail,
                0,
                &noted,
                false,
                notes,
            )),
            log(QUALITY, "inspection failed", notes),
            status(WorkflowStatus::Failed),
        ]);
    } else if !open_high.is_empty() {
        let indices: Vec<usize> = open_high.iter().map(|(i, _)| *i).collect();
        let listing = open_high
            .iter()
            .map(|(i, issue)| format!("#{i}: {}", issue.description))
            .collect::<Vec<_>>()
            .join("; ");

        if entry.rework_count < entry.rework_limit {
            let notes = format!("Rework required for {listing}");
            script.extend([
                Decision::tool(ToolCall::set_quality_report(
                    QualityVerdict::Rework,
                    checked,
                    &noted,
                    false,
                    &notes,
                )),
                log(QUALITY, "rework requested", &notes),
                status(WorkflowStatus::Rework),
                Decision::delegate(
                    PRODUCTION,
                    json!({
                        "rework": true,
                        "issues": indices,
                        "instructions": listing,
                    }),
                ),
            ]);
        } else {
            let notes = format!(
                "Rework limit of {} reached; unresolved {listing}",
                entry.rework_limit
            );
            script.extend([
                Decision::tool(ToolCall::set_quality_report(
                    QualityVerdict::Fail,
                    checked,
                    &noted,
                    false,
                    &notes,
                )),
                log(QUALITY, "inspection failed", &notes),
                status(WorkflowStatus::Failed),
            ]);
        }
    } else {
        let resolved_high = entry
            .issues
            .iter()
            .enumerate()
            .filter(|(_, i)| i.resolved && i.severity == Severity::High)
            .map(|(i, issue)| format!("#{i}: {}", issue.description))
            .collect::<Vec<_>>();
        let mut notes = format!("Inspected {checked} components; no open high-severity issues");
        if !resolved_high.is_empty() {
            notes.push_str(&format!("; resolved after rework: {}", resolved_high.join("; ")));
        }
        script.extend([
            Decision::tool(ToolCall::set_quality_report(
                QualityVerdict::Pass,
                checked,
                &noted,
                true,
                &notes,
            )),
            log(QUALITY, "inspection passed", &notes),
            status(WorkflowStatus::QualityApproved),
            Decision::delegate(LOGISTICS, json!({})),
        ]);
    }
    script.push(Decision::finish(json!({ "stage": "quality" })));
    script
}

pub fn quality() -> RoleSpec {
    RoleSpec::new(QUALITY, ScriptedPolicy::new(|task| Ok(quality_script(task))))
        .describe("Inspects components for safety; passes, sends back for rework or fails")
        .with_tools(tools([
            StateTool::ReadState,
            StateTool::UpdateStatus,
            StateTool::LogAction,
            StateTool::ReportIssue,
            StateTool::SetQualityReport,
        ]))
        .delegating_to([LOGISTICS, PRODUCTION])
}

fn logistics_script(task: &RoleTask) -> Vec<Decision> {
    let entry = &task.entry;
    let gift = intake::read_request(&entry.request).gift;
    let name = entry
        .subject
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "friend".into());
    let paper = intake::color_of(&gift).unwrap_or("festive red");
    let packaging = format!(
        "Sturdy gift box for {} components, wrapped in {paper} paper with a gold ribbon",
        entry.components.len()
    );
    let message = format!("Dear {name}, here is the {gift} you wished for. Merry Christmas!");

    vec![
        Decision::tool(ToolCall::read_state()),
        Decision::tool(ToolCall::set_packaging(&packaging, &message)),
        log(LOGISTICS, "packaged", &packaging),
        status(WorkflowStatus::Packaged),
        Decision::delegate(IMAGE_PROMPT, json!({ "gift": gift })),
        Decision::finish(json!({ "stage": "logistics" })),
    ]
}

pub fn logistics() -> RoleSpec {
    RoleSpec::new(
        LOGISTICS,
        ScriptedPolicy::new(|task| Ok(logistics_script(task))),
    )
    .describe("Designs packaging and writes the gift card")
    .with_tools(tools([
        StateTool::ReadState,
        StateTool::SetPackaging,
        StateTool::UpdateStatus,
        StateTool::LogAction,
    ]))
    .delegating_to([IMAGE_PROMPT])
}
