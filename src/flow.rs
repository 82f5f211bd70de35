//! Flow graphs and everything that edits them.
//!
//! A [`model::Flow`] is a named set of dialog nodes. Nodes link to each other
//! with ordered, conditional [`model::Transition`]s. All edits are computed by
//! the [`store::FlowGraphStore`] as [`command::Command`]s and applied through
//! [`history::CommandHistory`], which makes them undoable.

pub mod clipboard;
pub mod command;
pub mod editor;
pub mod error;
pub mod history;
pub mod model;
pub mod naming;
pub mod params;
pub mod store;
pub mod transition;

pub use clipboard::{ClipboardBuffer, ClipboardEntry};
pub use command::Command;
pub use editor::FlowEditor;
pub use error::FlowError;
pub use history::CommandHistory;
pub use model::{Flow, FlowDocument, Node, Transition, TransitionTarget};
pub use naming::{normalize_flow_name, validate_flow_name, validate_node_name};
pub use params::ParameterTable;
pub use store::{FlowGraphStore, NodePatch};
pub use transition::{
    ConditionEvaluator, MoveDirection, RhaiConditionEvaluator, TransitionDraft, TransitionResolver,
};
