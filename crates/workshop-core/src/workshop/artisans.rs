//! Artisan roles: each trade builds one kind of component.

use serde_json::{json, Value};
use workshop_state::{NewComponent, WorkflowRecord};

use crate::role_orchestration::roles::{Decision, RoleSpec, RoleTask, ScriptedPolicy};
use crate::tools::{StateTool, ToolCall};

pub const LIBRARIAN: &str = "librarian_elf";

/// A trade and the component it contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub role: &'static str,
    pub craft: &'static str,
    pub component_type: &'static str,
    pub material: &'static str,
    pub dimensions: &'static str,
}

impl Trade {
    /// The librarian documents the build instead of producing a part.
    pub fn makes_component(&self) -> bool {
        self.role != LIBRARIAN
    }
}

const fn entry(
    role: &'static str,
    craft: &'static str,
    component_type: &'static str,
    material: &'static str,
    dimensions: &'static str,
) -> Trade {
    Trade {
        role,
        craft,
        component_type,
        material,
        dimensions,
    }
}

pub static TRADES: [Trade; 20] = [
    entry("3d_printer_elf", "printed", "chassis", "PLA filament", "20x10x6cm"),
    entry("woodworker_elf", "carved", "wooden_body", "beech wood", "30x20x15cm"),
    entry("blacksmith_elf", "forged", "metal_frame", "mild steel", "40x25x5cm"),
    entry("fabric_elf", "sewed", "fabric_cover", "organic cotton", "35x25cm"),
    entry("leather_elf", "stitched", "leather_trim", "vegetable-tanned leather", "20x5cm"),
    entry("glass_elf", "blew", "glass_dome", "tempered glass", "12cm diameter"),
    entry("ceramics_elf", "fired", "ceramic_shell", "stoneware", "15x15x10cm"),
    entry("mechanic_elf", "assembled", "drivetrain", "steel axles and rubber wheels", "4 wheels, 6cm"),
    entry("electronics_elf", "soldered", "control_board", "FR4 PCB with 2.4GHz receiver", "5x4cm"),
    entry("battery_elf", "packed", "battery_pack", "rechargeable NiMH cells", "6V 1800mAh"),
    entry("welding_elf", "welded", "welded_joints", "steel filler wire", "6 joints"),
    entry("painter_elf", "painted", "paint_finish", "non-toxic acrylic paint", "two coats"),
    entry("airbrush_elf", "airbrushed", "airbrush_art", "water-based airbrush ink", "full body"),
    entry("engraver_elf", "engraved", "engraving", "laser-etched plate", "6x2cm"),
    entry("polish_elf", "polished", "polished_surface", "beeswax polish", "all exposed surfaces"),
    entry("decal_elf", "applied", "decal_set", "vinyl decals", "8 pieces"),
    entry("sound_engineer_elf", "tuned", "sound_module", "mini speaker and sound chip", "3x3cm"),
    entry("light_designer_elf", "wired", "light_kit", "low-voltage LEDs", "12 LEDs"),
    entry("software_elf", "programmed", "firmware", "embedded firmware", "64KB"),
    entry(LIBRARIAN, "catalogued", "build_notes", "archive paper", "1 binder"),
];

pub fn trade(role: &str) -> Option<&'static Trade> {
    TRADES.iter().find(|t| t.role == role)
}

/// First `<base>-<n>` id not yet used in `record`.
pub fn next_component_id(record: &WorkflowRecord, base: &str) -> String {
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|id| !record.has_component(id))
        .unwrap_or_else(|| base.to_string())
}

fn build_script(trade: &'static Trade, task: &RoleTask) -> Vec<Decision> {
    let gift = task
        .payload
        .get("gift")
        .and_then(Value::as_str)
        .unwrap_or(task.entry.request.as_str());
    let color = task.payload.get("color").and_then(Value::as_str);
    let id = next_component_id(&task.entry, trade.component_type);

    let material = match (trade.role, color) {
        ("painter_elf" | "airbrush_elf", Some(color)) => format!("{} ({color})", trade.material),
        _ => trade.material.to_string(),
    };
    let action = if task.is_rework() { "rework" } else { trade.craft };
    let component = NewComponent {
        id: id.clone(),
        component_type: trade.component_type.to_string(),
        material,
        dimensions: trade.dimensions.to_string(),
        details: format!("{} {} for {gift}", trade.craft, trade.component_type),
        created_by: trade.role.to_string(),
    };

    vec![
        Decision::tool(ToolCall::add_component(&component)),
        Decision::tool(ToolCall::log_action(
            trade.role,
            action,
            &format!("{} {id}", trade.craft),
        )),
        Decision::finish(json!({ "component_id": id })),
    ]
}

fn librarian_script(task: &RoleTask) -> Vec<Decision> {
    let ids = task
        .entry
        .components
        .iter()
        .map(|c| c.id.as_str())
        .collect::<Vec<_>>();
    vec![
        Decision::tool(ToolCall::log_action(
            LIBRARIAN,
            "documented",
            &format!("Catalogued {} components: {}", ids.len(), ids.join(", ")),
        )),
        Decision::finish(json!({ "catalogued": ids.len() })),
    ]
}

/// Role definition for one trade.
pub fn artisan(trade: &'static Trade) -> RoleSpec {
    let tools = [
        StateTool::ReadState,
        StateTool::AddComponent,
        StateTool::LogAction,
        StateTool::ReportIssue,
    ];
    if !trade.makes_component() {
        return RoleSpec::new(
            trade.role,
            ScriptedPolicy::new(|task| Ok(librarian_script(task))),
        )
        .describe("Keeps the build records for every gift")
        .with_tools([StateTool::ReadState, StateTool::LogAction].map(StateTool::as_str));
    }

    RoleSpec::new(
        trade.role,
        ScriptedPolicy::new(move |task| Ok(build_script(trade, task))),
    )
    .describe(format!("Builds the {}", trade.component_type.replace('_', " ")))
    .with_tools(tools.map(StateTool::as_str))
    .delegating_to([LIBRARIAN])
}

pub fn all() -> Vec<RoleSpec> {
    TRADES.iter().map(artisan).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use workshop_state::{WorkflowId, WorkflowMutation};

    #[test]
    fn test_roster_is_unique() {
        let mut roles: Vec<_> = TRADES.iter().map(|t| t.role).collect();
        roles.sort();
        roles.dedup();
        assert_eq!(roles.len(), TRADES.len());
        assert!(trade("3d_printer_elf").is_some());
        assert!(!trade(LIBRARIAN).unwrap().makes_component());
    }

    #[test]
    fn test_next_component_id_skips_existing() {
        let mut record = WorkflowRecord::new(WorkflowId::from("WF-ID"), "a car", None, 1);
        assert_eq!(next_component_id(&record, "chassis"), "chassis-1");
        record
            .apply(
                WorkflowMutation::AddComponent(NewComponent {
                    id: "chassis-1".into(),
                    component_type: "chassis".into(),
                    material: "PLA".into(),
                    dimensions: "-".into(),
                    details: String::new(),
                    created_by: "3d_printer_elf".into(),
                }),
                chrono::Utc::now(),
            )
            .unwrap();
        assert_eq!(next_component_id(&record, "chassis"), "chassis-2");
    }

    #[test]
    fn test_librarian_cannot_add_components() {
        let spec = artisan(trade(LIBRARIAN).unwrap());
        assert!(!spec.permits_tool("add_component"));
        assert!(spec.delegates_to.is_empty());
    }
}
