//! Delegation graph: immutable authorization wiring between roles.
//!
//! An edge `A -> B` means "A may delegate to B". Cycles are legal (quality
//! review sends work back to production); termination comes from the
//! executor's budgets, not from the graph shape.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::role_orchestration::error::{GraphError, GraphResult};
use crate::role_orchestration::roles::{RoleId, RoleSpec};
use crate::tools::ToolLayer;

/// Validated, read-only delegation graph.
#[derive(Debug, Clone)]
pub struct DelegationGraph {
    roles: BTreeMap<RoleId, RoleSpec>,
    entry: RoleId,
}

impl DelegationGraph {
    pub fn builder() -> DelegationGraphBuilder {
        DelegationGraphBuilder::default()
    }

    pub fn entry(&self) -> &RoleId {
        &self.entry
    }

    pub fn role(&self, id: &RoleId) -> Option<&RoleSpec> {
        self.roles.get(id)
    }

    /// Roles in id order.
    pub fn roles(&self) -> impl Iterator<Item = &RoleSpec> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Whether `from` may delegate to `to`.
    pub fn permits(&self, from: &RoleId, to: &RoleId) -> bool {
        self.roles
            .get(from)
            .is_some_and(|spec| spec.delegates_to.contains(to))
    }

    /// All edges, sorted by source then target.
    pub fn edges(&self) -> Vec<(RoleId, RoleId)> {
        self.roles
            .values()
            .flat_map(|spec| {
                spec.delegates_to
                    .iter()
                    .map(move |to| (spec.id.clone(), to.clone()))
            })
            .collect()
    }

    /// Roles reachable from the entry role, the entry included.
    pub fn reachable(&self) -> BTreeSet<RoleId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.entry.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(spec) = self.roles.get(&id) {
                stack.extend(spec.delegates_to.iter().cloned());
            }
        }
        seen
    }

    /// Whether the graph contains a directed cycle.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DelegationGraph,
            id: &RoleId,
            marks: &mut BTreeMap<RoleId, Mark>,
        ) -> bool {
            match marks.get(id) {
                Some(Mark::Visiting) => return true,
                Some(Mark::Done) => return false,
                None => {}
            }
            marks.insert(id.clone(), Mark::Visiting);
            if let Some(spec) = graph.roles.get(id) {
                for next in &spec.delegates_to {
                    if visit(graph, next, marks) {
                        return true;
                    }
                }
            }
            marks.insert(id.clone(), Mark::Done);
            false
        }

        let mut marks = BTreeMap::new();
        self.roles.keys().any(|id| visit(self, id, &mut marks))
    }
}

/// Collects role definitions and extra edges, then validates them once.
#[derive(Debug, Clone, Default)]
pub struct DelegationGraphBuilder {
    roles: Vec<RoleSpec>,
    edges: Vec<(RoleId, RoleId)>,
    entry: Option<RoleId>,
}

impl DelegationGraphBuilder {
    pub fn role(mut self, spec: RoleSpec) -> Self {
        self.roles.push(spec);
        self
    }

    /// Grant `from` permission to delegate to `to`.
    pub fn allow(mut self, from: impl Into<RoleId>, to: impl Into<RoleId>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn entry(mut self, id: impl Into<RoleId>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Validate against `tools` and freeze the graph.
    ///
    /// Rejects duplicate roles, a missing or undeclared entry role, edges to
    /// undeclared roles and tools the tool layer does not know.
    pub fn build(self, tools: &ToolLayer) -> GraphResult<DelegationGraph> {
        let mut roles: BTreeMap<RoleId, RoleSpec> = BTreeMap::new();
        for spec in self.roles {
            if roles.contains_key(&spec.id) {
                return Err(GraphError::DuplicateRole(spec.id.to_string()));
            }
            roles.insert(spec.id.clone(), spec);
        }

        for (from, to) in self.edges {
            let spec = roles
                .get_mut(&from)
                .ok_or_else(|| GraphError::UnknownDelegationTarget {
                    role: from.to_string(),
                    target: to.to_string(),
                })?;
            spec.delegates_to.insert(to);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !roles.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry.to_string()));
        }

        for spec in roles.values() {
            if let Some(target) = spec.delegates_to.iter().find(|t| !roles.contains_key(*t)) {
                return Err(GraphError::UnknownDelegationTarget {
                    role: spec.id.to_string(),
                    target: target.to_string(),
                });
            }
            if let Some(tool) = spec.tools.iter().find(|t| !tools.knows(t)) {
                return Err(GraphError::UnknownTool {
                    role: spec.id.to_string(),
                    tool: tool.clone(),
                });
            }
        }

        let graph = DelegationGraph { roles, entry };
        let reachable = graph.reachable();
        for id in graph.roles.keys().filter(|id| !reachable.contains(*id)) {
            warn!(role = %id, "role is unreachable from the entry role");
        }
        Ok(graph)
    }
}
