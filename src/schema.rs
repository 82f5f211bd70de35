use std::{fs, path::Path};

use anyhow::Context;
use schemars::schema_for;

use crate::{flow::model::FlowDocument, skill::Skill};

pub const FLOW_SCHEMA_FILE: &str = "flow.schema.json";
pub const SKILL_SCHEMA_FILE: &str = "skill.schema.json";

/// Write the JSON schemas of the flow document and the skill listing into
/// `out_dir`.
pub fn write_schema(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let flow_json = serde_json::to_string_pretty(&schema_for!(FlowDocument))?;
    fs::write(out_dir.join(FLOW_SCHEMA_FILE), flow_json)?;

    let skill_json = serde_json::to_string_pretty(&schema_for!(Skill))?;
    fs::write(out_dir.join(SKILL_SCHEMA_FILE), skill_json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::{Flow, Node, Transition};
    use tempfile::tempdir;

    #[test]
    fn documents_validate_against_the_written_schema() {
        let dir = tempdir().unwrap();
        write_schema(dir.path()).unwrap();

        let raw = fs::read_to_string(dir.path().join(FLOW_SCHEMA_FILE)).unwrap();
        let schema: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let compiled = jsonschema::validator_for(&schema).expect("schema compiles");

        let mut flow = Flow::new("main");
        flow.nodes.push(Node::new("entry").with_transition(Transition::new(Some("ok"), "END")));
        let instance = serde_json::to_value(flow.to_document()).unwrap();
        assert!(compiled.is_valid(&instance), "instance did not validate");
        assert!(dir.path().join(SKILL_SCHEMA_FILE).exists());
    }
}
