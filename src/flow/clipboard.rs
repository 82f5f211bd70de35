use crate::flow::{
    model::{Flow, Node, Transition},
    naming::unique_name,
};

/// What the clipboard currently holds. Always a detached deep copy.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipboardEntry {
    Node(Node),
    Transition(Transition),
}

/// Single-slot clipboard for nodes and transitions.
#[derive(Debug, Clone, Default)]
pub struct ClipboardBuffer {
    entry: Option<ClipboardEntry>,
}

impl ClipboardBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy(&mut self, node: &Node) {
        self.entry = Some(ClipboardEntry::Node(node.clone()));
    }

    pub fn copy_transition(&mut self, transition: &Transition) {
        self.entry = Some(ClipboardEntry::Transition(transition.clone()));
    }

    pub fn entry(&self) -> Option<&ClipboardEntry> {
        self.entry.as_ref()
    }

    pub fn can_paste_node(&self) -> bool {
        matches!(self.entry, Some(ClipboardEntry::Node(_)))
    }

    pub fn can_paste_transition(&self) -> bool {
        matches!(self.entry, Some(ClipboardEntry::Transition(_)))
    }

    /// A fresh node for `into`, renamed when its name is already taken there.
    ///
    /// Transition targets are kept as they were; pasting into another flow
    /// can therefore leave links pointing at nodes that do not exist there.
    pub fn paste(&self, into: &Flow) -> Option<Node> {
        let ClipboardEntry::Node(node) = self.entry.as_ref()? else {
            return None;
        };
        let mut pasted = node.clone();
        if into.contains_node(&node.name) {
            let base = format!("{}-copy", node.name);
            pasted.name = unique_name(&base, |n| into.contains_node(n));
        }
        Some(pasted)
    }

    pub fn paste_transition(&self) -> Option<Transition> {
        match self.entry.as_ref()? {
            ClipboardEntry::Transition(t) => Some(t.clone()),
            ClipboardEntry::Node(_) => None,
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
