use std::{fs, path::Path};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    flow::{error::FlowError, model::Node},
    skill::{GraphFragment, Skill, SkillSource},
};

pub const SKILL_SUFFIX: &str = ".skill.json";

/// A skill stored as JSON: its listing data plus node templates. Every string
/// inside `nodes` is a handlebars template over the generation parameters.
///
/// ```json
/// {
///   "id": "choice",
///   "name": "Single choice",
///   "parameterSchema": { "type": "object", "required": ["question"] },
///   "nodes": [
///     { "name": "ask", "onEnter": ["say {{question}}"], "next": [{ "node": "END" }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTemplate {
    #[serde(flatten)]
    pub skill: Skill,
    pub nodes: Vec<Value>,
}

/// Skills rendered locally from [`SkillTemplate`]s.
#[derive(Debug, Default)]
pub struct TemplateSkillRegistry {
    skills: DashMap<String, SkillTemplate>,
}

impl TemplateSkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, template: SkillTemplate) {
        info!("Registered skill {}", template.skill.id);
        self.skills.insert(template.skill.id.clone(), template);
    }

    /// Register every `*.skill.json` in `dir`. A missing directory is empty;
    /// unreadable files are logged and skipped.
    pub fn load_dir(&self, dir: &Path) -> anyhow::Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            let is_skill = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SKILL_SUFFIX));
            if !is_skill {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))
                .and_then(|s| {
                    serde_json::from_str::<SkillTemplate>(&s)
                        .with_context(|| format!("parsing {}", path.display()))
                });
            match parsed {
                Ok(template) => {
                    self.register(template);
                    loaded += 1;
                }
                Err(e) => error!("Failed to load skill: {:#}", e),
            }
        }
        Ok(loaded)
    }

    fn check_parameters(skill: &Skill, parameters: &Value) -> Result<(), FlowError> {
        if skill.parameter_schema.is_null() {
            return Ok(());
        }
        let invalid = |reason: String| FlowError::InvalidParameters {
            skill: skill.id.clone(),
            reason,
        };
        let validator = jsonschema::validator_for(&skill.parameter_schema)
            .map_err(|e| invalid(format!("bad parameter schema: {e}")))?;
        let errors: Vec<String> = validator.iter_errors(parameters).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(invalid(errors.join("; ")))
        }
    }
}

fn render_value(hbs: &Handlebars, value: &Value, parameters: &Value) -> Result<Value, String> {
    Ok(match value {
        Value::String(s) => Value::String(hbs.render_template(s, parameters).map_err(|e| e.to_string())?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(hbs, v, parameters))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), render_value(hbs, v, parameters)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

#[async_trait]
impl SkillSource for TemplateSkillRegistry {
    async fn list_skills(&self) -> Vec<Skill> {
        let mut skills: Vec<Skill> = self.skills.iter().map(|t| t.skill.clone()).collect();
        skills.sort_by(|a, b| a.id.cmp(&b.id));
        skills
    }

    async fn generate_flow(&self, skill_id: &str, parameters: &Value) -> Result<GraphFragment, FlowError> {
        let template = self
            .skills
            .get(skill_id)
            .map(|t| t.value().clone())
            .ok_or_else(|| FlowError::UnknownSkill(skill_id.to_string()))?;
        Self::check_parameters(&template.skill, parameters)?;

        let mut hbs = Handlebars::new();
        // node fields are code, not HTML
        hbs.register_escape_fn(handlebars::no_escape);

        let mut nodes = Vec::with_capacity(template.nodes.len());
        for raw in &template.nodes {
            let invalid = |reason: String| FlowError::InvalidParameters {
                skill: skill_id.to_string(),
                reason,
            };
            let rendered = render_value(&hbs, raw, parameters).map_err(invalid)?;
            let node: Node = serde_json::from_value(rendered).map_err(|e| invalid(e.to_string()))?;
            nodes.push(node);
        }
        debug!(skill = skill_id, nodes = nodes.len(), "generated fragment");
        Ok(GraphFragment { nodes })
    }
}
