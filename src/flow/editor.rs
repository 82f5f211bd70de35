use tracing::info;

use crate::flow::{
    clipboard::ClipboardBuffer,
    command::Command,
    error::FlowError,
    history::CommandHistory,
    model::{Flow, Node, Transition},
    naming::normalize_flow_name,
    store::{FlowGraphStore, NodePatch},
    transition::{self, MoveDirection, TransitionDraft},
};

/// The synchronous editing surface: every mutation goes through the
/// [`CommandHistory`] so it can be undone.
#[derive(Debug, Clone, Default)]
pub struct FlowEditor {
    store: FlowGraphStore,
    history: CommandHistory,
    clipboard: ClipboardBuffer,
}

impl FlowEditor {
    pub fn new(history: CommandHistory) -> Self {
        Self {
            store: FlowGraphStore::new(),
            history,
            clipboard: ClipboardBuffer::new(),
        }
    }

    pub fn store(&self) -> &FlowGraphStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut FlowGraphStore {
        &mut self.store
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn clipboard(&self) -> &ClipboardBuffer {
        &self.clipboard
    }

    /// Replace everything with freshly loaded flows. History is dropped since
    /// its snapshots no longer describe the store.
    pub fn load(&mut self, flows: Vec<Flow>) {
        self.store.load(flows);
        self.history.clear();
    }

    /// Apply and record a command built against the current store.
    pub fn commit(&mut self, command: Command) {
        self.history.execute(&mut self.store, command);
    }

    fn run(&mut self, command: Result<Command, FlowError>) -> Result<(), FlowError> {
        let command = command?;
        self.commit(command);
        Ok(())
    }

    pub fn list_flows(&self) -> Vec<String> {
        self.store.list_flows()
    }

    pub fn get_flow(&self, name: &str) -> Result<Flow, FlowError> {
        self.store.get_flow(name)
    }

    pub fn create_flow(&mut self, name: &str) -> Result<(), FlowError> {
        self.run(self.store.create_flow(name))?;
        info!("Created flow {name}");
        Ok(())
    }

    /// Create a flow from a name as typed by a user, who may include the file suffix.
    pub fn create_flow_from_input(&mut self, input: &str) -> Result<String, FlowError> {
        let name = normalize_flow_name(input.trim()).to_string();
        self.create_flow(&name)?;
        Ok(name)
    }

    pub fn rename_flow(&mut self, from: &str, to: &str) -> Result<(), FlowError> {
        self.run(self.store.rename_flow(from, to))
    }

    pub fn add_node(&mut self, flow: &str, node: Node) -> Result<(), FlowError> {
        self.run(self.store.add_node(flow, node))
    }

    pub fn add_nodes(&mut self, flow: &str, nodes: Vec<Node>) -> Result<(), FlowError> {
        self.run(self.store.add_nodes(flow, nodes))
    }

    pub fn remove_node(&mut self, flow: &str, node: &str) -> Result<(), FlowError> {
        self.run(self.store.remove_node(flow, node))
    }

    pub fn update_node(&mut self, flow: &str, node: &str, patch: NodePatch) -> Result<(), FlowError> {
        self.run(self.store.update_node(flow, node, patch))
    }

    pub fn set_start_node(&mut self, flow: &str, node: &str) -> Result<(), FlowError> {
        self.run(self.store.set_start_node(flow, node))
    }

    /// Whether `node` exists and is not already the start node of `flow`.
    pub fn can_make_start_node(&self, flow: &str, node: &str) -> bool {
        self.store
            .get_flow(flow)
            .map(|f| f.contains_node(node) && f.start_node() != Some(node))
            .unwrap_or(false)
    }

    fn node(&self, flow: &str, node: &str) -> Result<Node, FlowError> {
        self.store
            .get_flow(flow)?
            .node(node)
            .cloned()
            .ok_or_else(|| FlowError::unknown_node(flow, node))
    }

    fn edit_transitions(
        &mut self,
        flow: &str,
        node: &str,
        edit: impl FnOnce(&Node) -> Node,
    ) -> Result<(), FlowError> {
        let edited = edit(&self.node(flow, node)?);
        self.update_node(flow, node, NodePatch::transitions(edited.transitions))
    }

    pub fn add_transition(&mut self, flow: &str, node: &str, t: Transition) -> Result<(), FlowError> {
        self.edit_transitions(flow, node, |n| transition::add_transition(n, t))
    }

    pub fn replace_transition(
        &mut self,
        flow: &str,
        node: &str,
        index: usize,
        t: Transition,
    ) -> Result<(), FlowError> {
        self.edit_transitions(flow, node, |n| transition::replace_transition(n, index, t))
    }

    pub fn remove_transition(&mut self, flow: &str, node: &str, index: usize) -> Result<(), FlowError> {
        self.edit_transitions(flow, node, |n| transition::remove_transition(n, index))
    }

    pub fn move_transition(
        &mut self,
        flow: &str,
        node: &str,
        index: usize,
        direction: MoveDirection,
    ) -> Result<(), FlowError> {
        self.edit_transitions(flow, node, |n| transition::move_transition(n, index, direction))
    }

    pub fn submit_draft(&mut self, draft: TransitionDraft) -> Result<(), FlowError> {
        self.run(draft.submit(&self.store))
    }

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.store)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.store)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes(&self.store)
    }

    pub fn copy_node(&mut self, flow: &str, node: &str) -> Result<(), FlowError> {
        let node = self.node(flow, node)?;
        self.clipboard.copy(&node);
        Ok(())
    }

    /// Paste the clipboard node into `flow`. Returns the name it got, or
    /// `None` when the clipboard holds no node.
    pub fn paste_node(&mut self, flow: &str) -> Result<Option<String>, FlowError> {
        let target = self.store.get_flow(flow)?;
        let Some(node) = self.clipboard.paste(&target) else {
            return Ok(None);
        };
        let name = node.name.clone();
        self.add_node(flow, node)?;
        Ok(Some(name))
    }

    pub fn copy_transition(&mut self, flow: &str, node: &str, index: usize) -> Result<(), FlowError> {
        let node = self.node(flow, node)?;
        if let Some(t) = node.transitions.get(index) {
            self.clipboard.copy_transition(t);
        }
        Ok(())
    }

    /// Append the clipboard transition to `node`. Returns whether anything was pasted.
    pub fn paste_transition(&mut self, flow: &str, node: &str) -> Result<bool, FlowError> {
        match self.clipboard.paste_transition() {
            Some(t) => self.add_transition(flow, node, t).map(|_| true),
            None => Ok(false),
        }
    }
}
