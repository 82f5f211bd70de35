use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::{error::FlowError, model::Node};

pub mod compiler;
pub mod registry;

pub use compiler::{FragmentInsertion, SkillCompiler};
pub use registry::{SkillTemplate, TemplateSkillRegistry};

/// A reusable sub-graph generator, as listed in the skills menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    /// JSON schema the generation parameters must satisfy.
    #[serde(default)]
    pub parameter_schema: Value,
}

/// Nodes produced by a skill. Transition targets inside refer to other
/// fragment nodes by their fragment-local names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    pub nodes: Vec<Node>,
}

impl GraphFragment {
    pub fn entry(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }
}

#[async_trait]
pub trait SkillSource: Send + Sync {
    async fn list_skills(&self) -> Vec<Skill>;

    /// Build the fragment for `skill_id`. `UnknownSkill` when it is not
    /// registered, `InvalidParameters` when `parameters` do not fit its schema.
    async fn generate_flow(&self, skill_id: &str, parameters: &Value) -> Result<GraphFragment, FlowError>;
}
