//! External capabilities: opaque collaborators reached through the tool-call
//! shape (image generation, message delivery, web search, ...).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use workshop_state::WorkflowId;

use crate::role_orchestration::error::{GraphError, GraphResult};
use crate::tools::StateTool;

/// A capability invoked with a JSON request and answering with a JSON result
/// or a failure message.
#[async_trait]
pub trait ExternalCapability: Send + Sync {
    async fn call(&self, workflow_id: &WorkflowId, input: &Value) -> Result<Value, String>;
}

/// Named capabilities available to roles.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Arc<dyn ExternalCapability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` under `name`.
    ///
    /// Names must be unique and may not shadow a state tool.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        capability: impl ExternalCapability + 'static,
    ) -> GraphResult<()> {
        let name = name.into();
        if StateTool::from_name(&name).is_some() {
            return Err(GraphError::ReservedToolName(name));
        }
        if self.entries.contains_key(&name) {
            return Err(GraphError::DuplicateCapability(name));
        }
        self.entries.insert(name, Arc::new(capability));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExternalCapability>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
