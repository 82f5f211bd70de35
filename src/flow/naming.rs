use once_cell::sync::Lazy;
use regex::Regex;

use crate::flow::{
    error::FlowError,
    model::{FLOW_SUFFIX, TransitionTarget},
};

static FLOW_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_/-]+$").expect("flow name pattern compiles"));

/// Check a candidate flow name against the allowed alphabet and the names
/// already in use. `exists` receives the persisted file name.
pub fn validate_flow_name(name: &str, exists: impl Fn(&str) -> bool) -> Result<String, FlowError> {
    if !FLOW_NAME.is_match(name) {
        return Err(FlowError::InvalidName(name.to_string()));
    }
    if exists(&format!("{name}{FLOW_SUFFIX}")) {
        return Err(FlowError::NameConflict(name.to_string()));
    }
    Ok(name.to_string())
}

/// A node name must be something a transition can point at: not blank, not
/// `END` or `#`, and not ending in `.flow.json`.
pub fn validate_node_name(name: &str) -> Result<(), FlowError> {
    match TransitionTarget::classify(name) {
        TransitionTarget::NodeRef(_) if !name.trim().is_empty() => Ok(()),
        _ => Err(FlowError::InvalidNodeName(name.to_string())),
    }
}

/// Strip a trailing `.flow.json` (any case) from user input, the way the
/// "new flow" prompt accepts both `main` and `main.flow.json`.
pub fn normalize_flow_name(input: &str) -> &str {
    let trimmed = input.trim();
    let cut = trimmed.len().saturating_sub(FLOW_SUFFIX.len());
    match trimmed.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(FLOW_SUFFIX) => &trimmed[..cut],
        _ => trimmed,
    }
}

/// `base` if free, otherwise `base-2`, `base-3`, ... whichever is free first.
pub fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}-{n}");
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
