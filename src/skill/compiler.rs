use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
    flow::{
        command::Command,
        error::FlowError,
        model::TransitionTarget,
        naming::unique_name,
        store::FlowGraphStore,
    },
    skill::{GraphFragment, Skill, SkillSource},
};

/// Result of placing a fragment into a flow.
#[derive(Debug, Clone)]
pub struct FragmentInsertion {
    pub command: Command,
    /// Fragment-local name to the name the node got in the flow.
    pub renamed: BTreeMap<String, String>,
}

impl FragmentInsertion {
    /// Name of the fragment's first node inside the flow.
    pub fn entry(&self, fragment: &GraphFragment) -> Option<&str> {
        let first = fragment.entry()?;
        self.renamed.get(&first.name).map(String::as_str)
    }
}

/// Turns skills into graph edits.
#[derive(Clone)]
pub struct SkillCompiler {
    source: Arc<dyn SkillSource>,
}

impl SkillCompiler {
    pub fn new(source: Arc<dyn SkillSource>) -> Self {
        Self { source }
    }

    pub async fn list_skills(&self) -> Vec<Skill> {
        self.source.list_skills().await
    }

    pub async fn generate(&self, skill_id: &str, parameters: &Value) -> Result<GraphFragment, FlowError> {
        self.source.generate_flow(skill_id, parameters).await
    }

    /// Build the command adding `fragment` to `flow`. Names already used in
    /// the flow get a numeric suffix and links between fragment nodes follow
    /// the rename; links leaving the fragment are kept as they are.
    pub fn insert_fragment(
        store: &FlowGraphStore,
        flow: &str,
        fragment: &GraphFragment,
    ) -> Result<FragmentInsertion, FlowError> {
        let target = store.get_flow(flow)?;

        let mut renamed = BTreeMap::new();
        let mut taken: Vec<String> = target.node_names().map(str::to_string).collect();
        for node in &fragment.nodes {
            let name = unique_name(&node.name, |n| taken.iter().any(|t| t == n));
            taken.push(name.clone());
            renamed.insert(node.name.clone(), name);
        }

        let nodes = fragment
            .nodes
            .iter()
            .map(|node| {
                let mut node = node.clone();
                node.name = renamed[&node.name].clone();
                for t in &mut node.transitions {
                    if let TransitionTarget::NodeRef(local) = &t.target {
                        if let Some(name) = renamed.get(local) {
                            t.target = TransitionTarget::NodeRef(name.clone());
                        }
                    }
                }
                node
            })
            .collect();

        let command = store.add_nodes(flow, nodes)?;
        Ok(FragmentInsertion { command, renamed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::{Node, Transition};

    fn fragment() -> GraphFragment {
        GraphFragment {
            nodes: vec![
                Node::new("ask").with_transition(Transition::always("done")),
                Node::new("done")
                    .with_transition(Transition::always("outside"))
                    .with_transition(Transition::always("END")),
            ],
        }
    }

    fn store(nodes: &[&str]) -> FlowGraphStore {
        let mut store = FlowGraphStore::new();
        store.create_flow("main").unwrap().apply(&mut store);
        for n in nodes {
            store.add_node("main", Node::new(*n)).unwrap().apply(&mut store);
        }
        store
    }

    #[test]
    fn colliding_names_get_numeric_suffixes() {
        let mut store = store(&["ask", "done", "done-2"]);
        let fragment = fragment();
        let insertion = SkillCompiler::insert_fragment(&store, "main", &fragment).unwrap();
        assert_eq!(insertion.renamed["ask"], "ask-2");
        assert_eq!(insertion.renamed["done"], "done-3");
        assert_eq!(insertion.entry(&fragment), Some("ask-2"));

        insertion.command.apply(&mut store);
        let flow = store.get_flow("main").unwrap();
        let ask = flow.node("ask-2").unwrap();
        assert_eq!(ask.transitions[0].target, TransitionTarget::NodeRef("done-3".into()));
        let done = flow.node("done-3").unwrap();
        assert_eq!(done.transitions[0].target, TransitionTarget::NodeRef("outside".into()));
        assert_eq!(done.transitions[1].target, TransitionTarget::EndFlow);
        // existing start node stays
        assert_eq!(flow.start_node(), Some("ask"));
    }

    #[test]
    fn empty_flow_starts_at_the_fragment_entry() {
        let mut store = store(&[]);
        let insertion = SkillCompiler::insert_fragment(&store, "main", &fragment()).unwrap();
        insertion.command.apply(&mut store);
        let flow = store.get_flow("main").unwrap();
        assert_eq!(flow.start_node(), Some("ask"));
        assert_eq!(flow.nodes().len(), 2);
    }

    #[test]
    fn unknown_flow_is_refused() {
        let store = store(&[]);
        assert!(matches!(
            SkillCompiler::insert_fragment(&store, "ghost", &fragment()),
            Err(FlowError::UnknownFlow(_))
        ));
    }
}
