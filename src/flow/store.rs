use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::info;

use crate::flow::{
    command::{Command, FlowChange},
    error::FlowError,
    model::{Flow, Node, Transition},
    naming::{validate_flow_name, validate_node_name},
};

/// Partial update for a node. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub name: Option<String>,
    pub transitions: Option<Vec<Transition>>,
    pub position: Option<Value>,
    pub extra: Option<Map<String, Value>>,
}

impl NodePatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn transitions(transitions: Vec<Transition>) -> Self {
        Self {
            transitions: Some(transitions),
            ..Default::default()
        }
    }
}

/// All flows known to the editor, keyed by flow name.
///
/// Mutating operations validate against the current state and hand back a
/// [`Command`]; the store itself only changes when a command is applied.
/// Readers always get clones.
#[derive(Debug, Clone, Default)]
pub struct FlowGraphStore {
    flows: BTreeMap<String, Flow>,
}

impl FlowGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole content with freshly loaded (clean) flows.
    pub fn load(&mut self, flows: Vec<Flow>) {
        self.flows = flows.into_iter().map(|f| (f.name.clone(), f)).collect();
        info!("Loaded {} flows", self.flows.len());
    }

    pub fn list_flows(&self) -> Vec<String> {
        self.flows.keys().cloned().collect()
    }

    pub fn get_flow(&self, name: &str) -> Result<Flow, FlowError> {
        self.flow(name).cloned()
    }

    pub fn contains_flow(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.flows.values().any(|f| f.dirty)
    }

    pub fn dirty_flows(&self) -> Vec<String> {
        self.flows
            .values()
            .filter(|f| f.dirty)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn mark_clean<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.set_dirty(names, false);
    }

    pub fn mark_dirty<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.set_dirty(names, true);
    }

    fn set_dirty<'a>(&mut self, names: impl IntoIterator<Item = &'a String>, dirty: bool) {
        for name in names {
            if let Some(flow) = self.flows.get_mut(name) {
                flow.dirty = dirty;
            }
        }
    }

    /// Put a snapshot back into a slot. Used by commands only; whatever lands
    /// in the store this way differs from what was saved, hence dirty.
    pub(crate) fn restore(&mut self, name: &str, flow: Option<Flow>) {
        match flow {
            Some(mut flow) => {
                flow.dirty = true;
                self.flows.insert(name.to_string(), flow);
            }
            None => {
                self.flows.remove(name);
            }
        }
    }

    fn flow(&self, name: &str) -> Result<&Flow, FlowError> {
        self.flows
            .get(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))
    }

    fn file_exists(&self, file_name: &str) -> bool {
        self.flows.values().any(|f| f.file_name() == file_name)
    }

    /// Clone a flow, run `edit` on the clone, and wrap both sides in a command.
    fn edit(
        &self,
        flow_name: &str,
        label: String,
        edit: impl FnOnce(&mut Flow) -> Result<(), FlowError>,
    ) -> Result<Command, FlowError> {
        let before = self.flow(flow_name)?.clone();
        let mut after = before.clone();
        edit(&mut after)?;
        after.dirty = true;
        Ok(Command::new(
            label,
            vec![FlowChange {
                name: flow_name.to_string(),
                before: Some(before),
                after: Some(after),
            }],
        ))
    }

    pub fn create_flow(&self, name: &str) -> Result<Command, FlowError> {
        let name = validate_flow_name(name, |f| self.file_exists(f))?;
        Ok(Command::new(
            format!("create flow {name}"),
            vec![FlowChange {
                name: name.clone(),
                before: None,
                after: Some(Flow::new(name)),
            }],
        ))
    }

    pub fn rename_flow(&self, from: &str, to: &str) -> Result<Command, FlowError> {
        let before = self.flow(from)?.clone();
        let to = validate_flow_name(to, |f| self.file_exists(f))?;
        let mut after = before.clone();
        after.name = to.clone();
        after.dirty = true;
        Ok(Command::new(
            format!("rename flow {from} to {to}"),
            vec![
                FlowChange {
                    name: from.to_string(),
                    before: Some(before),
                    after: None,
                },
                FlowChange {
                    name: to,
                    before: None,
                    after: Some(after),
                },
            ],
        ))
    }

    pub fn add_node(&self, flow_name: &str, node: Node) -> Result<Command, FlowError> {
        let label = format!("add node {} to {flow_name}", node.name);
        self.add_nodes_with_label(flow_name, vec![node], label)
    }

    /// Add several nodes as one undoable step (skill fragments, pastes of
    /// many nodes). The first node becomes the start node of an empty flow.
    pub fn add_nodes(&self, flow_name: &str, nodes: Vec<Node>) -> Result<Command, FlowError> {
        let label = format!("add {} nodes to {flow_name}", nodes.len());
        self.add_nodes_with_label(flow_name, nodes, label)
    }

    fn add_nodes_with_label(
        &self,
        flow_name: &str,
        nodes: Vec<Node>,
        label: String,
    ) -> Result<Command, FlowError> {
        self.edit(flow_name, label, |flow| {
            for node in nodes {
                validate_node_name(&node.name)?;
                if flow.contains_node(&node.name) {
                    return Err(FlowError::NodeConflict {
                        flow: flow.name.clone(),
                        node: node.name,
                    });
                }
                if flow.start_node.is_none() {
                    flow.start_node = Some(node.name.clone());
                }
                flow.nodes.push(node);
            }
            Ok(())
        })
    }

    pub fn remove_node(&self, flow_name: &str, node_name: &str) -> Result<Command, FlowError> {
        let label = format!("remove node {node_name} from {flow_name}");
        self.edit(flow_name, label, |flow| {
            let index = flow
                .node_index(node_name)
                .ok_or_else(|| FlowError::unknown_node(flow_name, node_name))?;
            flow.nodes.remove(index);
            if flow.start_node.as_deref() == Some(node_name) {
                flow.start_node = flow.nodes.first().map(|n| n.name.clone());
            }
            Ok(())
        })
    }

    pub fn update_node(
        &self,
        flow_name: &str,
        node_name: &str,
        patch: NodePatch,
    ) -> Result<Command, FlowError> {
        let label = format!("update node {node_name} in {flow_name}");
        self.edit(flow_name, label, |flow| {
            let index = flow
                .node_index(node_name)
                .ok_or_else(|| FlowError::unknown_node(flow_name, node_name))?;

            if let Some(new_name) = &patch.name {
                validate_node_name(new_name)?;
                if new_name != node_name && flow.contains_node(new_name) {
                    return Err(FlowError::NodeConflict {
                        flow: flow_name.to_string(),
                        node: new_name.clone(),
                    });
                }
                if flow.start_node.as_deref() == Some(node_name) {
                    flow.start_node = Some(new_name.clone());
                }
            }

            let node = &mut flow.nodes[index];
            if let Some(name) = patch.name {
                node.name = name;
            }
            if let Some(transitions) = patch.transitions {
                node.transitions = transitions;
            }
            if let Some(position) = patch.position {
                node.position = Some(position);
            }
            if let Some(extra) = patch.extra {
                node.extra = extra;
            }
            Ok(())
        })
    }

    pub fn set_start_node(&self, flow_name: &str, node_name: &str) -> Result<Command, FlowError> {
        let label = format!("set start node of {flow_name} to {node_name}");
        self.edit(flow_name, label, |flow| {
            if !flow.contains_node(node_name) {
                return Err(FlowError::InvalidStartNode {
                    flow: flow_name.to_string(),
                    node: node_name.to_string(),
                });
            }
            flow.start_node = Some(node_name.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(flow: &str, nodes: &[&str]) -> FlowGraphStore {
        let mut store = FlowGraphStore::new();
        store.create_flow(flow).unwrap().apply(&mut store);
        for n in nodes {
            store.add_node(flow, Node::new(*n)).unwrap().apply(&mut store);
        }
        store
    }

    #[test]
    fn create_flow_is_empty_and_dirty() {
        let store = store_with("main", &[]);
        let flow = store.get_flow("main").unwrap();
        assert!(flow.is_empty());
        assert!(flow.start_node().is_none());
        assert!(flow.is_dirty());
        assert_eq!(store.list_flows(), vec!["main".to_string()]);
    }

    #[test]
    fn create_flow_rejects_bad_names_and_duplicates() {
        let store = store_with("main", &[]);
        assert_eq!(
            store.create_flow("main").unwrap_err(),
            FlowError::NameConflict("main".into())
        );
        assert_eq!(
            store.create_flow("bad name").unwrap_err(),
            FlowError::InvalidName("bad name".into())
        );
    }

    #[test]
    fn building_a_command_does_not_mutate() {
        let store = store_with("main", &["a"]);
        let before = store.get_flow("main").unwrap();
        let _pending = store.remove_node("main", "a").unwrap();
        assert_eq!(store.get_flow("main").unwrap(), before);
    }

    #[test]
    fn first_node_becomes_start_node() {
        let store = store_with("main", &["a", "b"]);
        assert_eq!(store.get_flow("main").unwrap().start_node(), Some("a"));
    }

    #[test]
    fn unknown_references_fail() {
        let store = store_with("main", &["a"]);
        assert_eq!(
            store.add_node("nope", Node::new("x")).unwrap_err(),
            FlowError::UnknownFlow("nope".into())
        );
        assert_eq!(
            store.remove_node("main", "x").unwrap_err(),
            FlowError::unknown_node("main", "x")
        );
        assert_eq!(
            store.set_start_node("main", "x").unwrap_err(),
            FlowError::InvalidStartNode {
                flow: "main".into(),
                node: "x".into()
            }
        );
        assert_eq!(
            store.add_node("main", Node::new("a")).unwrap_err(),
            FlowError::NodeConflict {
                flow: "main".into(),
                node: "a".into()
            }
        );
    }

    #[test]
    fn failed_multi_node_add_leaves_store_untouched() {
        let store = store_with("main", &["a"]);
        let before = store.get_flow("main").unwrap();
        let err = store
            .add_nodes("main", vec![Node::new("b"), Node::new("a")])
            .unwrap_err();
        assert!(matches!(err, FlowError::NodeConflict { .. }));
        assert_eq!(store.get_flow("main").unwrap(), before);
    }

    #[test]
    fn sentinel_node_names_are_refused() {
        let store = store_with("main", &["a"]);
        let before = store.get_flow("main").unwrap();
        for bad in ["END", "#", "", "x.flow.json"] {
            assert_eq!(
                store.add_node("main", Node::new(bad)).unwrap_err(),
                FlowError::InvalidNodeName(bad.into())
            );
        }
        assert_eq!(
            store
                .add_nodes("main", vec![Node::new("ok"), Node::new("#")])
                .unwrap_err(),
            FlowError::InvalidNodeName("#".into())
        );
        assert_eq!(
            store.update_node("main", "a", NodePatch::rename("END")).unwrap_err(),
            FlowError::InvalidNodeName("END".into())
        );
        assert_eq!(store.get_flow("main").unwrap(), before);
    }

    #[test]
    fn removing_start_node_moves_start() {
        let mut store = store_with("main", &["a", "b"]);
        store.remove_node("main", "a").unwrap().apply(&mut store);
        assert_eq!(store.get_flow("main").unwrap().start_node(), Some("b"));
        store.remove_node("main", "b").unwrap().apply(&mut store);
        assert_eq!(store.get_flow("main").unwrap().start_node(), None);
    }

    #[test]
    fn renaming_a_node_keeps_start_in_sync() {
        let mut store = store_with("main", &["a", "b"]);
        store
            .update_node("main", "a", NodePatch::rename("entry"))
            .unwrap()
            .apply(&mut store);
        let flow = store.get_flow("main").unwrap();
        assert_eq!(flow.start_node(), Some("entry"));
        assert!(flow.contains_node("entry"));

        let err = store
            .update_node("main", "entry", NodePatch::rename("b"))
            .unwrap_err();
        assert!(matches!(err, FlowError::NodeConflict { .. }));
    }

    #[test]
    fn rename_flow_moves_the_slot_and_inverts() {
        let mut store = store_with("main", &["a"]);
        let cmd = store.rename_flow("main", "greeting").unwrap();
        cmd.apply(&mut store);
        assert_eq!(store.list_flows(), vec!["greeting".to_string()]);
        assert!(store.get_flow("greeting").unwrap().contains_node("a"));

        cmd.invert(&mut store);
        assert_eq!(store.list_flows(), vec!["main".to_string()]);
    }

    #[test]
    fn get_flow_returns_a_detached_copy() {
        let store = store_with("main", &["a"]);
        let mut copy = store.get_flow("main").unwrap();
        copy.nodes.clear();
        assert!(store.get_flow("main").unwrap().contains_node("a"));
    }

    #[test]
    fn dirty_tracking() {
        let mut store = store_with("main", &[]);
        assert!(store.has_unsaved_changes());
        store.mark_clean(&["main".to_string()]);
        assert!(!store.has_unsaved_changes());
        store.add_node("main", Node::new("a")).unwrap().apply(&mut store);
        assert_eq!(store.dirty_flows(), vec!["main".to_string()]);
    }
}
