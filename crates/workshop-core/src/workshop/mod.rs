//! The standard workshop: a rule-driven role roster wired as a delegation graph.
//!
//! reception -> design -> production -> artisans / quality -> logistics ->
//! image prompt -> final approval -> response. Purchases take
//! design -> online shopper -> quality instead, and quality may send work back
//! to production for rework.
//!
//! Every role is a [`ScriptedPolicy`](crate::role_orchestration::roles::ScriptedPolicy)
//! built from keyword rules, so the engine runs end to end without any
//! reasoning backend. Swap a role's policy with
//! [`RoleSpec::with_policy`] to plug one in.

pub mod artisans;
pub mod intake;
pub mod managers;
pub mod support;

use crate::orchestrator::{WorkflowEngine, WorkflowEngineBuilder};
use crate::role_orchestration::graph::{DelegationGraph, DelegationGraphBuilder};
use crate::role_orchestration::roles::RoleSpec;
use crate::tools::CapabilityRegistry;

pub const RECEPTION: &str = "reception_manager";
pub const DESIGN: &str = "design_manager";
pub const PRODUCTION: &str = "production_manager";
pub const QUALITY: &str = "quality_manager";
pub const LOGISTICS: &str = "logistics_manager";
pub const IMAGE_PROMPT: &str = "image_prompt_generator";
pub const FINAL_APPROVER: &str = "santa_claus";
pub const RESPONSE_COMPOSER: &str = "response_composer";
pub const ONLINE_SHOPPER: &str = "online_shopper_elf";

/// Capability names the standard roles look for.
pub const GENERATE_IMAGE: &str = "generate_image";
pub const SEND_EMAIL: &str = "send_email";
pub const WEB_SEARCH: &str = "web_search";

/// Which optional capabilities the standard roles should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkshopOptions {
    pub image_generation: bool,
    pub email_delivery: bool,
    pub web_search: bool,
}

impl WorkshopOptions {
    /// Enable each step whose capability is registered.
    pub fn from_capabilities(capabilities: &CapabilityRegistry) -> Self {
        Self {
            image_generation: capabilities.contains(GENERATE_IMAGE),
            email_delivery: capabilities.contains(SEND_EMAIL),
            web_search: capabilities.contains(WEB_SEARCH),
        }
    }
}

/// Every standard role, managers first.
pub fn standard_roles(options: &WorkshopOptions) -> Vec<RoleSpec> {
    let mut roles = vec![
        managers::reception(),
        managers::design(),
        managers::production(),
        managers::quality(),
        managers::logistics(),
        support::image_prompt_generator(options.image_generation),
        support::santa_claus(),
        support::response_composer(options.email_delivery),
        support::online_shopper(options.web_search),
    ];
    roles.extend(artisans::all());
    roles
}

/// A graph builder over `roles` entered at reception.
pub fn graph_from(roles: impl IntoIterator<Item = RoleSpec>) -> DelegationGraphBuilder {
    roles
        .into_iter()
        .fold(DelegationGraph::builder(), DelegationGraphBuilder::role)
        .entry(RECEPTION)
}

pub fn standard_graph(options: &WorkshopOptions) -> DelegationGraphBuilder {
    graph_from(standard_roles(options))
}

/// Engine builder for the standard workshop using whichever of `capabilities`
/// the roles know how to use.
pub fn standard_engine(capabilities: CapabilityRegistry) -> WorkflowEngineBuilder {
    let options = WorkshopOptions::from_capabilities(&capabilities);
    WorkflowEngine::builder(standard_graph(&options)).capabilities(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role_orchestration::roles::RoleId;
    use crate::tools::ToolLayer;

    #[test]
    fn test_standard_graph_validates() {
        let graph = standard_graph(&WorkshopOptions::default())
            .build(&ToolLayer::default())
            .unwrap();
        assert_eq!(graph.len(), 9 + artisans::TRADES.len());
        assert_eq!(graph.entry().as_str(), RECEPTION);
        assert_eq!(graph.reachable().len(), graph.len());
        assert!(graph.has_cycle(), "quality and production form the rework loop");
        assert!(graph.permits(&RoleId::from(QUALITY), &RoleId::from(PRODUCTION)));
        assert!(!graph.permits(&RoleId::from(RECEPTION), &RoleId::from(QUALITY)));
    }

    #[test]
    fn test_capability_roles_need_registered_capabilities() {
        let options = WorkshopOptions {
            image_generation: true,
            ..WorkshopOptions::default()
        };
        assert!(standard_graph(&options)
            .build(&ToolLayer::default())
            .is_err());
    }
}
