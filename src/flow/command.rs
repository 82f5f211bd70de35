use crate::flow::{model::Flow, store::FlowGraphStore};

/// One flow slot before and after a mutation. `None` means "no such flow".
#[derive(Debug, Clone, PartialEq)]
pub struct FlowChange {
    pub(crate) name: String,
    pub(crate) before: Option<Flow>,
    pub(crate) after: Option<Flow>,
}

/// An invertible mutation produced by [`FlowGraphStore`].
///
/// Commands carry full snapshots of the flows they touch, so `apply` and
/// `invert` are exact and can be replayed any number of times. Building a
/// command never touches the store; nothing changes until it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    label: String,
    changes: Vec<FlowChange>,
}

impl Command {
    pub(crate) fn new(label: impl Into<String>, changes: Vec<FlowChange>) -> Self {
        Self {
            label: label.into(),
            changes,
        }
    }

    /// Human readable description, e.g. `add node entry to main`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Names of the flows this command writes to.
    pub fn flows(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.name.as_str())
    }

    pub fn apply(&self, store: &mut FlowGraphStore) {
        for change in &self.changes {
            store.restore(&change.name, change.after.clone());
        }
    }

    pub fn invert(&self, store: &mut FlowGraphStore) {
        for change in self.changes.iter().rev() {
            store.restore(&change.name, change.before.clone());
        }
    }
}
