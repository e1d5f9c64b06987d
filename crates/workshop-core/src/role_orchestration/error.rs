//! Error types for roles and the delegation graph.

/// Configuration errors caught while building a delegation graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("role {0} is declared more than once")]
    DuplicateRole(String),

    #[error("graph has no entry role")]
    MissingEntry,

    #[error("entry role {0} is not declared")]
    UnknownEntry(String),

    #[error("role {role} delegates to undeclared role {target}")]
    UnknownDelegationTarget { role: String, target: String },

    #[error("role {role} declares unknown tool {tool}")]
    UnknownTool { role: String, tool: String },

    #[error("capability {0} is registered more than once")]
    DuplicateCapability(String),

    #[error("capability {0} shadows a built-in state tool")]
    ReservedToolName(String),
}

/// Failure reported by a role's decision procedure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PolicyError {
    pub message: String,
}

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for graph construction.
pub type GraphResult<T> = std::result::Result<T, GraphError>;
