use rhai::{Engine, Scope};
use serde_json::Value;
use thiserror::Error;
use tracing::{trace, warn};

use crate::flow::{
    command::Command,
    error::FlowError,
    model::{Flow, Node, Transition, TransitionTarget},
    store::{FlowGraphStore, NodePatch},
};

#[derive(Debug, Clone, Error, PartialEq)]
#[error("condition `{condition}` could not be evaluated: {reason}")]
pub struct ConditionError {
    pub condition: String,
    pub reason: String,
}

/// Evaluates a transition condition against a conversation context.
///
/// The expression language is up to the implementation; the resolver only
/// cares about the boolean.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, condition: &str, context: &Value) -> Result<bool, ConditionError>;
}

/// Default evaluator running conditions as [Rhai](https://rhai.rs) expressions.
///
/// Every top-level key of the context object becomes a script variable, and
/// the whole object is also available as `ctx`:
///
/// ```rhai
/// x > 1
/// ctx.user.age >= 18 && lang == "en"
/// ```
///
/// A script that does not produce a boolean is an error, and so is one that
/// runs past [`MAX_OPERATIONS`].
#[derive(Debug)]
pub struct RhaiConditionEvaluator {
    engine: Engine,
}

/// Upper bound on the work a single condition may do.
pub const MAX_OPERATIONS: u64 = 10_000;

impl Default for RhaiConditionEvaluator {
    fn default() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(64, 32);
        engine.set_max_string_size(64 * 1024);
        Self { engine }
    }
}

impl ConditionEvaluator for RhaiConditionEvaluator {
    fn evaluate(&self, condition: &str, context: &Value) -> Result<bool, ConditionError> {
        let mut scope = Scope::new();
        let fail = |reason: String| ConditionError {
            condition: condition.to_string(),
            reason,
        };

        let whole = rhai::serde::to_dynamic(context).map_err(|e| fail(e.to_string()))?;
        scope.push_dynamic("ctx", whole);
        if let Value::Object(map) = context {
            for (k, v) in map {
                if let Ok(dynamic) = rhai::serde::to_dynamic(v) {
                    scope.push_dynamic(k.as_str(), dynamic);
                }
            }
        }

        self.engine
            .eval_with_scope::<bool>(&mut scope, condition)
            .map_err(|e| fail(e.to_string()))
    }
}

/// Picks the destination of a node for a given context.
#[derive(Debug, Clone, Default)]
pub struct TransitionResolver<E = RhaiConditionEvaluator> {
    evaluator: E,
}

impl<E: ConditionEvaluator> TransitionResolver<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// First transition whose condition holds wins. Blank conditions always
    /// hold. No match yields [`TransitionTarget::Missing`], which is a state
    /// the caller reports, not an error. A condition that fails to evaluate
    /// counts as not satisfied.
    pub fn resolve(&self, node: &Node, context: &Value) -> TransitionTarget {
        for transition in &node.transitions {
            let matched = match transition.condition.as_deref() {
                None => true,
                Some(c) if c.trim().is_empty() => true,
                Some(c) => match self.evaluator.evaluate(c, context) {
                    Ok(b) => b,
                    Err(err) => {
                        warn!(node = %node.name, "{err}");
                        false
                    }
                },
            };
            if matched {
                trace!(node = %node.name, target = %transition.target, "transition matched");
                return transition.target.clone();
            }
        }
        TransitionTarget::Missing
    }

    /// Resolve by name inside a flow.
    pub fn resolve_in(
        &self,
        flow: &Flow,
        node_name: &str,
        context: &Value,
    ) -> Result<TransitionTarget, FlowError> {
        let node = flow
            .node(node_name)
            .ok_or_else(|| FlowError::unknown_node(flow.name(), node_name))?;
        Ok(self.resolve(node, context))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    pub fn offset(self) -> isize {
        match self {
            MoveDirection::Up => -1,
            MoveDirection::Down => 1,
        }
    }

    /// `-1` is up, `+1` is down; anything else is not a direction.
    pub fn from_offset(offset: i64) -> Option<Self> {
        match offset {
            -1 => Some(MoveDirection::Up),
            1 => Some(MoveDirection::Down),
            _ => None,
        }
    }
}

/// Swap the transition at `index` with its neighbour. Out of range is a no-op.
pub fn move_transition(node: &Node, index: usize, direction: MoveDirection) -> Node {
    let mut moved = node.clone();
    let len = moved.transitions.len();
    if let Some(other) = index.checked_add_signed(direction.offset()) {
        if index < len && other < len {
            moved.transitions.swap(index, other);
        }
    }
    moved
}

pub fn add_transition(node: &Node, transition: Transition) -> Node {
    node.clone().with_transition(transition)
}

/// Replace the transition at `index`; out of range leaves the node as is.
pub fn replace_transition(node: &Node, index: usize, transition: Transition) -> Node {
    let mut edited = node.clone();
    if let Some(slot) = edited.transitions.get_mut(index) {
        *slot = transition;
    }
    edited
}

pub fn remove_transition(node: &Node, index: usize) -> Node {
    let mut edited = node.clone();
    if index < edited.transitions.len() {
        edited.transitions.remove(index);
    }
    edited
}

/// A transition that leads nowhere useful inside its flow.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingLink {
    pub node: String,
    pub index: usize,
    pub target: TransitionTarget,
}

/// Transitions with a missing target or pointing at a node the flow does not
/// have. External flow links are not checked.
pub fn dangling_links(flow: &Flow) -> Vec<DanglingLink> {
    flow.nodes()
        .iter()
        .flat_map(|node| {
            node.transitions
                .iter()
                .enumerate()
                .filter(|(_, t)| match &t.target {
                    TransitionTarget::Missing => true,
                    TransitionTarget::NodeRef(name) => !flow.contains_node(name),
                    _ => false,
                })
                .map(|(index, t)| DanglingLink {
                    node: node.name.clone(),
                    index,
                    target: t.target.clone(),
                })
        })
        .collect()
}

/// An open "add/edit transition" form.
///
/// Nothing is recorded until [`TransitionDraft::submit`]; dropping the draft
/// discards the edit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDraft {
    flow: String,
    node: String,
    edit_index: Option<usize>,
    pub condition: Option<String>,
    pub target: String,
}

impl TransitionDraft {
    /// Draft a new transition appended to `node`.
    pub fn add(flow: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            node: node.into(),
            edit_index: None,
            condition: None,
            target: String::new(),
        }
    }

    /// Draft an edit of the existing transition at `index`, prefilled.
    pub fn edit(flow: &Flow, node_name: &str, index: usize) -> Result<Self, FlowError> {
        let node = flow
            .node(node_name)
            .ok_or_else(|| FlowError::unknown_node(flow.name(), node_name))?;
        let existing = node.transitions.get(index);
        Ok(Self {
            flow: flow.name().to_string(),
            node: node_name.to_string(),
            edit_index: existing.map(|_| index),
            condition: existing.and_then(|t| t.condition.clone()),
            target: existing
                .map(|t| t.target.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    pub fn is_edit(&self) -> bool {
        self.edit_index.is_some()
    }

    /// Turn the draft into a command against the current store content.
    pub fn submit(self, store: &FlowGraphStore) -> Result<Command, FlowError> {
        let flow = store.get_flow(&self.flow)?;
        let node = flow
            .node(&self.node)
            .ok_or_else(|| FlowError::unknown_node(&self.flow, &self.node))?;
        let mut transition = self
            .edit_index
            .and_then(|i| node.transitions.get(i).cloned())
            .unwrap_or_else(|| Transition::always(TransitionTarget::Missing));
        transition.condition = self.condition.filter(|c| !c.trim().is_empty());
        transition.target = TransitionTarget::classify(&self.target);
        let edited = match self.edit_index {
            Some(i) => replace_transition(node, i, transition),
            None => add_transition(node, transition),
        };
        store.update_node(&self.flow, &self.node, NodePatch::transitions(edited.transitions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rhai() -> TransitionResolver {
        TransitionResolver::default()
    }

    fn node(transitions: Vec<Transition>) -> Node {
        let mut n = Node::new("n");
        n.transitions = transitions;
        n
    }

    #[test]
    fn first_true_condition_wins_with_fallback() {
        let resolver = rhai();
        let n = node(vec![
            Transition::new(Some("x>1"), "A"),
            Transition::new(None, "B"),
        ]);
        assert_eq!(
            resolver.resolve(&n, &json!({"x": 2})),
            TransitionTarget::NodeRef("A".into())
        );
        assert_eq!(
            resolver.resolve(&n, &json!({"x": 0})),
            TransitionTarget::NodeRef("B".into())
        );
    }

    #[test]
    fn nothing_matches_is_missing() {
        let resolver = rhai();
        assert_eq!(
            resolver.resolve(&node(vec![Transition::new(Some("false"), "A")]), &json!({})),
            TransitionTarget::Missing
        );
        assert_eq!(resolver.resolve(&node(vec![]), &json!({})), TransitionTarget::Missing);
    }

    #[test]
    fn blank_condition_is_unconditional() {
        let resolver = rhai();
        let n = node(vec![Transition::new(Some("   "), "END")]);
        assert_eq!(resolver.resolve(&n, &json!({})), TransitionTarget::EndFlow);
    }

    #[test]
    fn broken_condition_is_skipped() {
        let resolver = rhai();
        let n = node(vec![
            Transition::new(Some("undefined_var > 3"), "A"),
            Transition::new(Some("\"not a bool\""), "B"),
            Transition::new(Some("true"), "#"),
        ]);
        assert_eq!(resolver.resolve(&n, &json!({})), TransitionTarget::ReturnToCaller);
    }

    #[test]
    fn nested_context_is_reachable() {
        let resolver = rhai();
        let n = node(vec![Transition::new(Some("ctx.user.age >= 18"), "adult.flow.json")]);
        assert_eq!(
            resolver.resolve(&n, &json!({"user": {"age": 30}})),
            TransitionTarget::ExternalFlow("adult.flow.json".into())
        );
    }

    #[test]
    fn runaway_condition_is_cut_off() {
        let evaluator = RhaiConditionEvaluator::default();
        assert!(evaluator.evaluate("loop {}", &json!({})).is_err());
        assert!(evaluator.evaluate("let n = 0; while true { n += 1; } n > 0", &json!({})).is_err());

        let n = node(vec![Transition::new(Some("loop {}"), "A"), Transition::always("B")]);
        assert_eq!(rhai().resolve(&n, &json!({})), TransitionTarget::NodeRef("B".into()));
    }

    struct Always(bool);
    impl ConditionEvaluator for Always {
        fn evaluate(&self, _: &str, _: &Value) -> Result<bool, ConditionError> {
            Ok(self.0)
        }
    }

    #[test]
    fn custom_evaluator_is_used() {
        let n = node(vec![Transition::new(Some("anything"), "A"), Transition::always("B")]);
        assert_eq!(
            TransitionResolver::new(Always(true)).resolve(&n, &json!({})),
            TransitionTarget::NodeRef("A".into())
        );
        assert_eq!(
            TransitionResolver::new(Always(false)).resolve(&n, &json!({})),
            TransitionTarget::NodeRef("B".into())
        );
    }

    #[test]
    fn move_transition_swaps_neighbours_only() {
        let n = node(vec![Transition::always("a"), Transition::always("b"), Transition::always("c")]);

        assert_eq!(move_transition(&n, 0, MoveDirection::Up), n);
        assert_eq!(move_transition(&n, 2, MoveDirection::Down), n);
        assert_eq!(move_transition(&n, 7, MoveDirection::Up), n);

        let down = move_transition(&n, 0, MoveDirection::Down);
        let names: Vec<_> = down.transitions.iter().map(|t| t.target.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn direction_from_offset() {
        assert_eq!(MoveDirection::from_offset(-1), Some(MoveDirection::Up));
        assert_eq!(MoveDirection::from_offset(1), Some(MoveDirection::Down));
        assert_eq!(MoveDirection::from_offset(2), None);
    }

    #[test]
    fn dangling_links_are_reported() {
        let mut flow = Flow::new("main");
        flow.nodes.push(node(vec![
            Transition::always("n"),
            Transition::always("ghost"),
            Transition::always(""),
            Transition::always("END"),
            Transition::always("other.flow.json"),
        ]));
        let links = dangling_links(&flow);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].index, 1);
        assert_eq!(links[1].target, TransitionTarget::Missing);
    }

    #[test]
    fn draft_submit_and_cancel() {
        let mut store = FlowGraphStore::new();
        store.create_flow("main").unwrap().apply(&mut store);
        store.add_node("main", Node::new("a")).unwrap().apply(&mut store);

        let mut draft = TransitionDraft::add("main", "a");
        draft.condition = Some("x > 1".into());
        draft.target = "END".into();
        draft.submit(&store).unwrap().apply(&mut store);

        let flow = store.get_flow("main").unwrap();
        let mut edit = TransitionDraft::edit(&flow, "a", 0).unwrap();
        assert!(edit.is_edit());
        assert_eq!(edit.target, "END");
        edit.target = "#".into();
        drop(edit);

        let flow = store.get_flow("main").unwrap();
        let t = &flow.node("a").unwrap().transitions[0];
        assert_eq!(t.target, TransitionTarget::EndFlow);
        assert_eq!(t.condition.as_deref(), Some("x > 1"));
    }
}
