use std::collections::VecDeque;

use tracing::debug;

use crate::flow::{command::Command, store::FlowGraphStore};

pub const DEFAULT_HISTORY_LIMIT: usize = 128;

/// Linear undo/redo over a [`FlowGraphStore`].
///
/// Recording a new command drops the redo path; there is no branching.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    undo_stack: VecDeque<Command>,
    redo_stack: Vec<Command>,
    limit: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` undo steps; the oldest fall off first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Apply `command` to `store` and remember it.
    pub fn execute(&mut self, store: &mut FlowGraphStore, command: Command) {
        command.apply(store);
        self.record(command);
    }

    /// Remember an already applied command.
    pub fn record(&mut self, command: Command) {
        debug!(command = command.label(), "recorded");
        self.undo_stack.push_back(command);
        if self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Revert the latest command. Returns its label, or `None` when there was
    /// nothing to undo.
    pub fn undo(&mut self, store: &mut FlowGraphStore) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        command.invert(store);
        debug!(command = command.label(), "undo");
        let label = command.label().to_string();
        self.redo_stack.push(command);
        Some(label)
    }

    pub fn redo(&mut self, store: &mut FlowGraphStore) -> Option<String> {
        let command = self.redo_stack.pop()?;
        command.apply(store);
        debug!(command = command.label(), "redo");
        let label = command.label().to_string();
        self.undo_stack.push_back(command);
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Whether any flow has unsaved changes.
    pub fn has_unsaved_changes(&self, store: &FlowGraphStore) -> bool {
        store.has_unsaved_changes()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::{Node, Transition};
    use crate::flow::store::NodePatch;

    fn snapshot(store: &FlowGraphStore) -> Vec<crate::flow::model::Flow> {
        store
            .list_flows()
            .iter()
            .map(|n| store.get_flow(n).unwrap())
            .collect()
    }

    #[test]
    fn undo_then_redo_restores_post_mutation_state() {
        let mut store = FlowGraphStore::new();
        let mut history = CommandHistory::new();

        let initial = snapshot(&store);

        let cmd = store.create_flow("main").unwrap();
        history.execute(&mut store, cmd);
        let cmd = store.add_node("main", Node::new("a")).unwrap();
        history.execute(&mut store, cmd);
        let cmd = store.add_node("main", Node::new("b")).unwrap();
        history.execute(&mut store, cmd);
        let cmd = store
            .update_node("main", "a", NodePatch::transitions(vec![Transition::always("b")]))
            .unwrap();
        history.execute(&mut store, cmd);
        let cmd = store.set_start_node("main", "b").unwrap();
        history.execute(&mut store, cmd);
        let cmd = store.rename_flow("main", "welcome").unwrap();
        history.execute(&mut store, cmd);

        let after = snapshot(&store);
        let n = history.undo_len();
        assert_eq!(n, 6);

        for _ in 0..n {
            assert!(history.undo(&mut store).is_some());
        }
        assert_eq!(snapshot(&store), initial);

        for _ in 0..n {
            assert!(history.redo(&mut store).is_some());
        }
        assert_eq!(snapshot(&store), after);
    }

    #[test]
    fn empty_stacks_are_silent() {
        let mut store = FlowGraphStore::new();
        let mut history = CommandHistory::new();
        assert_eq!(history.undo(&mut store), None);
        assert_eq!(history.redo(&mut store), None);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn new_mutation_clears_redo() {
        let mut store = FlowGraphStore::new();
        let mut history = CommandHistory::new();
        let cmd = store.create_flow("a").unwrap();
        history.execute(&mut store, cmd);
        history.undo(&mut store);
        assert!(history.can_redo());

        let cmd = store.create_flow("b").unwrap();
        history.execute(&mut store, cmd);
        assert!(!history.can_redo());
        assert_eq!(store.list_flows(), vec!["b".to_string()]);
    }

    #[test]
    fn limit_drops_oldest_steps() {
        let mut store = FlowGraphStore::new();
        let mut history = CommandHistory::with_limit(2);
        for name in ["a", "b", "c"] {
            let cmd = store.create_flow(name).unwrap();
            history.execute(&mut store, cmd);
        }
        assert_eq!(history.undo_len(), 2);
        history.undo(&mut store);
        history.undo(&mut store);
        assert_eq!(history.undo(&mut store), None);
        assert_eq!(store.list_flows(), vec!["a".to_string()]);
    }

    #[test]
    fn undo_marks_flow_dirty_even_after_save() {
        let mut store = FlowGraphStore::new();
        let mut history = CommandHistory::new();
        let cmd = store.create_flow("main").unwrap();
        history.execute(&mut store, cmd);
        let cmd = store.add_node("main", Node::new("a")).unwrap();
        history.execute(&mut store, cmd);

        store.mark_clean(&["main".to_string()]);
        assert!(!history.has_unsaved_changes(&store));

        history.undo(&mut store);
        assert!(history.has_unsaved_changes(&store));
        assert_eq!(history.undo_len(), 1);
    }
}
