//! Editing core for conversational flow graphs: flows of dialog nodes joined
//! by conditional transitions, with undo/redo, clipboard, skill insertion and
//! persistence to a directory of `*.flow.json` files.

pub mod config;
pub mod flow;
pub mod logger;
pub mod schema;
pub mod session;
pub mod skill;
pub mod storage;
pub mod workspace;
