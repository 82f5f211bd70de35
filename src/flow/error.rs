use thiserror::Error;

use crate::storage::StorageError;

/// Everything the editor core can refuse to do.
///
/// Validation errors are raised before any state is touched, so receiving
/// one of these from a store operation means the store is unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    #[error("invalid flow name `{0}`: only letters, numbers, underscores, slashes and hyphens are allowed")]
    InvalidName(String),

    #[error("flow `{0}` already exists")]
    NameConflict(String),

    #[error("unknown flow `{0}`")]
    UnknownFlow(String),

    #[error("unknown node `{node}` in flow `{flow}`")]
    UnknownNode { flow: String, node: String },

    #[error("node `{node}` cannot be the start node of `{flow}`: it does not exist")]
    InvalidStartNode { flow: String, node: String },

    #[error("`{0}` cannot name a node: it reads as an end, return, external flow or missing target")]
    InvalidNodeName(String),

    #[error("node `{node}` already exists in flow `{flow}`")]
    NodeConflict { flow: String, node: String },

    #[error("unknown skill `{0}`")]
    UnknownSkill(String),

    #[error("invalid parameters for skill `{skill}`: {reason}")]
    InvalidParameters { skill: String, reason: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("session is no longer valid")]
    SessionInvalidated,
}

impl FlowError {
    pub fn unknown_node(flow: impl Into<String>, node: impl Into<String>) -> Self {
        FlowError::UnknownNode {
            flow: flow.into(),
            node: node.into(),
        }
    }
}
