use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::error::FlowError;

/// Suffix every persisted flow document carries.
pub const FLOW_SUFFIX: &str = ".flow.json";
/// Transition target that terminates the conversation.
pub const END_TARGET: &str = "END";
/// Transition target that returns to the calling flow.
pub const RETURN_TARGET: &str = "#";

/// Where a transition leads.
///
/// On disk this is a single string; the variant is derived from it with
/// [`TransitionTarget::classify`] and written back with
/// [`TransitionTarget::as_str`], so sentinels survive a load/save cycle untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransitionTarget {
    Missing,
    EndFlow,
    ReturnToCaller,
    ExternalFlow(String),
    NodeRef(String),
}

impl TransitionTarget {
    /// Classify a raw target string. Pure and total.
    pub fn classify(raw: &str) -> Self {
        match raw {
            "" => TransitionTarget::Missing,
            END_TARGET => TransitionTarget::EndFlow,
            RETURN_TARGET => TransitionTarget::ReturnToCaller,
            s if s.ends_with(FLOW_SUFFIX) => TransitionTarget::ExternalFlow(s.to_string()),
            s => TransitionTarget::NodeRef(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransitionTarget::Missing => "",
            TransitionTarget::EndFlow => END_TARGET,
            TransitionTarget::ReturnToCaller => RETURN_TARGET,
            TransitionTarget::ExternalFlow(s) | TransitionTarget::NodeRef(s) => s,
        }
    }

    /// The badge a side panel shows for this target.
    pub fn label(&self) -> &str {
        match self {
            TransitionTarget::Missing => "Missing Link",
            TransitionTarget::EndFlow => "End",
            TransitionTarget::ReturnToCaller => "Return",
            TransitionTarget::ExternalFlow(s) | TransitionTarget::NodeRef(s) => s,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TransitionTarget::Missing)
    }

    pub fn node_name(&self) -> Option<&str> {
        match self {
            TransitionTarget::NodeRef(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for TransitionTarget {
    fn from(raw: String) -> Self {
        TransitionTarget::classify(&raw)
    }
}

impl From<&str> for TransitionTarget {
    fn from(raw: &str) -> Self {
        TransitionTarget::classify(raw)
    }
}

impl From<TransitionTarget> for String {
    fn from(target: TransitionTarget) -> Self {
        target.as_str().to_string()
    }
}

impl fmt::Display for TransitionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A conditional edge. An absent or blank condition always matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "node")]
    #[schemars(with = "String")]
    pub target: TransitionTarget,
    /// Fields this editor does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transition {
    pub fn new(condition: Option<&str>, target: impl Into<TransitionTarget>) -> Self {
        Self {
            condition: condition.map(str::to_string),
            target: target.into(),
            extra: Map::new(),
        }
    }

    /// A transition with no condition.
    pub fn always(target: impl Into<TransitionTarget>) -> Self {
        Self::new(None, target)
    }

    pub fn is_unconditional(&self) -> bool {
        self.condition
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true)
    }
}

/// A dialog state and its ordered outgoing transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    #[serde(rename = "next", default)]
    pub transitions: Vec<Transition>,
    /// Layout data owned by the diagram; carried, never read. An explicit
    /// `null` on disk stays `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Value>")]
    pub position: Option<Value>,
    /// Remaining document fields (`onEnter`, `onReceive`, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
            position: None,
            extra: Map::new(),
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_position(mut self, position: Value) -> Self {
        self.position = Some(position);
        self
    }
}

fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// The persisted shape of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    /// File name, always ending in `.flow.json`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named dialog graph held by the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub(crate) name: String,
    pub(crate) start_node: Option<String>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) dirty: bool,
    pub(crate) version: Option<String>,
    pub(crate) extra: Map<String, Value>,
}

impl Flow {
    /// A new empty flow. Empty flows have no start node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_node: None,
            nodes: Vec::new(),
            dirty: true,
            version: Some("0.1".to_string()),
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persisted identity, `<name>.flow.json`.
    pub fn file_name(&self) -> String {
        file_name_for(&self.name)
    }

    pub fn start_node(&self) -> Option<&str> {
        self.start_node.as_deref()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub(crate) fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build a clean flow from a loaded document.
    pub fn from_document(doc: FlowDocument) -> Result<Self, FlowError> {
        let name = doc
            .name
            .strip_suffix(FLOW_SUFFIX)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FlowError::InvalidName(doc.name.clone()))?
            .to_string();
        Ok(Self {
            name,
            start_node: doc.start_node,
            nodes: doc.nodes,
            dirty: false,
            version: doc.version,
            extra: doc.extra,
        })
    }

    pub fn to_document(&self) -> FlowDocument {
        FlowDocument {
            name: self.file_name(),
            version: self.version.clone(),
            start_node: self.start_node.clone(),
            nodes: self.nodes.clone(),
            extra: self.extra.clone(),
        }
    }
}

pub fn file_name_for(flow_name: &str) -> String {
    format!("{flow_name}{FLOW_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_covers_every_sentinel() {
        assert_eq!(TransitionTarget::classify(""), TransitionTarget::Missing);
        assert_eq!(TransitionTarget::classify("END"), TransitionTarget::EndFlow);
        assert_eq!(TransitionTarget::classify("#"), TransitionTarget::ReturnToCaller);
        assert_eq!(
            TransitionTarget::classify("sub.flow.json"),
            TransitionTarget::ExternalFlow("sub.flow.json".into())
        );
        assert_eq!(
            TransitionTarget::classify("nodeX"),
            TransitionTarget::NodeRef("nodeX".into())
        );
        // case matters for the sentinels
        assert_eq!(
            TransitionTarget::classify("end"),
            TransitionTarget::NodeRef("end".into())
        );
    }

    #[test]
    fn labels_match_the_side_panel() {
        assert_eq!(TransitionTarget::Missing.label(), "Missing Link");
        assert_eq!(TransitionTarget::EndFlow.label(), "End");
        assert_eq!(TransitionTarget::ReturnToCaller.label(), "Return");
        assert_eq!(TransitionTarget::classify("a.flow.json").label(), "a.flow.json");
    }

    #[test]
    fn sentinels_survive_serialization() {
        let raw = json!({
            "name": "main.flow.json",
            "version": "0.1",
            "startNode": "entry",
            "nodes": [{
                "name": "entry",
                "next": [
                    {"condition": "event.text == 'bye'", "node": "END"},
                    {"condition": "true", "node": "#"},
                    {"node": "other.flow.json"},
                    {"node": ""},
                    {"node": "entry"}
                ],
                "onEnter": ["say #hello"]
            }],
            "catchAll": {"next": []}
        });

        let doc: FlowDocument = serde_json::from_value(raw.clone()).unwrap();
        let targets: Vec<_> = doc.nodes[0].transitions.iter().map(|t| t.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                TransitionTarget::EndFlow,
                TransitionTarget::ReturnToCaller,
                TransitionTarget::ExternalFlow("other.flow.json".into()),
                TransitionTarget::Missing,
                TransitionTarget::NodeRef("entry".into()),
            ]
        );
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn unknown_fields_and_null_positions_survive() {
        let raw = json!({
            "name": "main.flow.json",
            "nodes": [
                {
                    "name": "a",
                    "next": [{"node": "b", "label": "go", "weight": 2}],
                    "position": null
                },
                {"name": "b", "next": [], "position": {"x": 10, "y": 20}},
                {"name": "c", "next": []}
            ]
        });

        let doc: FlowDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.nodes[0].position, Some(Value::Null));
        assert_eq!(doc.nodes[0].transitions[0].extra["label"], "go");
        assert_eq!(doc.nodes[2].position, None);
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn document_name_must_carry_suffix() {
        let doc = FlowDocument {
            name: "main.json".into(),
            version: None,
            start_node: None,
            nodes: vec![],
            extra: Map::new(),
        };
        assert_eq!(
            Flow::from_document(doc),
            Err(FlowError::InvalidName("main.json".into()))
        );
    }

    #[test]
    fn loaded_flow_is_clean_and_round_trips() {
        let mut flow = Flow::new("support/billing");
        flow.nodes.push(Node::new("entry").with_transition(Transition::always("END")));
        flow.start_node = Some("entry".into());

        let doc = flow.to_document();
        assert_eq!(doc.name, "support/billing.flow.json");

        let loaded = Flow::from_document(doc.clone()).unwrap();
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.to_document(), doc);
    }
}
