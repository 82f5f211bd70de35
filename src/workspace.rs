use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::EditorConfig,
    flow::{
        editor::FlowEditor,
        error::FlowError,
        history::CommandHistory,
        model::{Flow, TransitionTarget},
        transition::{TransitionResolver, dangling_links},
    },
    logger::instrument_request,
    session::SessionContext,
    skill::{Skill, SkillCompiler, SkillSource, TemplateSkillRegistry},
    storage::{FileFlowStorage, FlowStorage},
};

/// One editing session over a set of flows.
///
/// Graph edits are synchronous and go through [`Workspace::edit`]. The
/// editor lock is never held across an await; skill generation and saving
/// run without it. Skill insertions into the same flow are serialized by a
/// per-flow async lock, different flows proceed independently.
pub struct Workspace {
    editor: Mutex<FlowEditor>,
    storage: Arc<dyn FlowStorage>,
    skills: SkillCompiler,
    resolver: TransitionResolver,
    flow_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    functions: Mutex<Vec<Value>>,
}

impl Workspace {
    pub fn new(storage: Arc<dyn FlowStorage>, skills: Arc<dyn SkillSource>, history: CommandHistory) -> Self {
        Self {
            editor: Mutex::new(FlowEditor::new(history)),
            storage,
            skills: SkillCompiler::new(skills),
            resolver: TransitionResolver::default(),
            flow_locks: DashMap::new(),
            functions: Mutex::new(Vec::new()),
        }
    }

    /// Flows from `<root>/flows`, skills from `<root>/skills`.
    pub fn from_config(config: &EditorConfig) -> anyhow::Result<Self> {
        let registry = TemplateSkillRegistry::new();
        let loaded = registry.load_dir(&config.skills_dir())?;
        info!("Loaded {} skills from {}", loaded, config.skills_dir().display());
        Ok(Self::new(
            Arc::new(FileFlowStorage::new(config.flows_dir())),
            Arc::new(registry),
            CommandHistory::with_limit(config.history_limit),
        ))
    }

    fn lock_editor(&self) -> MutexGuard<'_, FlowEditor> {
        self.editor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flow_lock(&self, flow: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.flow_locks.entry(flow.to_string()).or_default().clone()
    }

    /// Load every flow and the available functions. Returns how many flows
    /// were loaded; documents with unusable names are skipped.
    #[tracing::instrument(skip(self, session), fields(user = session.user()))]
    pub async fn init(&self, session: &SessionContext) -> Result<usize, FlowError> {
        session.ensure_valid()?;
        let docs = self.storage.get_flows().await?;
        let functions = self.storage.get_available_functions().await?;

        let mut flows = Vec::with_capacity(docs.len());
        for doc in docs {
            match Flow::from_document(doc) {
                Ok(flow) => {
                    for link in dangling_links(&flow) {
                        warn!(
                            flow = flow.name(),
                            node = %link.node,
                            "transition {} points at `{}`",
                            link.index,
                            link.target.label()
                        );
                    }
                    flows.push(flow);
                }
                Err(e) => warn!("Skipping flow: {}", e),
            }
        }
        let count = flows.len();

        session.ensure_valid()?;
        self.lock_editor().load(flows);
        *self.functions.lock().unwrap_or_else(|p| p.into_inner()) = functions;
        info!("Workspace ready with {} flows", count);
        Ok(count)
    }

    /// Drop all flows, history and locks.
    pub fn dispose(&self) {
        self.lock_editor().load(Vec::new());
        self.flow_locks.clear();
        self.functions.lock().unwrap_or_else(|p| p.into_inner()).clear();
        info!("Workspace disposed");
    }

    /// Run a synchronous edit against the editor.
    pub fn edit<R>(
        &self,
        session: &SessionContext,
        edit: impl FnOnce(&mut FlowEditor) -> Result<R, FlowError>,
    ) -> Result<R, FlowError> {
        session.ensure_valid()?;
        edit(&mut self.lock_editor())
    }

    /// Read the editor state.
    pub fn view<R>(&self, view: impl FnOnce(&FlowEditor) -> R) -> R {
        view(&self.lock_editor())
    }

    pub fn resolve(
        &self,
        session: &SessionContext,
        flow: &str,
        node: &str,
        context: &Value,
    ) -> Result<TransitionTarget, FlowError> {
        session.ensure_valid()?;
        let flow = self.lock_editor().get_flow(flow)?;
        self.resolver.resolve_in(&flow, node, context)
    }

    pub fn available_functions(&self) -> Vec<Value> {
        self.functions.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub async fn list_skills(&self, session: &SessionContext) -> Result<Vec<Skill>, FlowError> {
        session.ensure_valid()?;
        Ok(self.skills.list_skills().await)
    }

    /// Save every flow. Dirty flags are cleared up front and put back when
    /// the storage refuses, so edits made while the save is in flight stay
    /// dirty either way.
    #[tracing::instrument(skip(self, session), fields(user = session.user()))]
    pub async fn save_all(&self, session: &SessionContext) -> Result<(), FlowError> {
        session.ensure_valid()?;
        let (docs, dirty) = {
            let mut editor = self.lock_editor();
            let dirty = editor.store().dirty_flows();
            if dirty.is_empty() {
                return Ok(());
            }
            let docs = editor
                .list_flows()
                .iter()
                .filter_map(|name| editor.get_flow(name).ok())
                .map(|flow| flow.to_document())
                .collect::<Vec<_>>();
            editor.store_mut().mark_clean(&dirty);
            (docs, dirty)
        };

        let result = instrument_request("save_flows", || self.storage.save_flows(docs)).await;
        if let Err(e) = result {
            self.lock_editor().store_mut().mark_dirty(&dirty);
            return Err(FlowError::Persistence(e));
        }
        info!("Saved {} changed flows", dirty.len());
        Ok(())
    }

    /// Generate `skill_id` and add its nodes to `flow` as one undoable step.
    /// Returns the name of the inserted entry node.
    #[tracing::instrument(skip(self, session, parameters), fields(user = session.user()))]
    pub async fn insert_skill(
        &self,
        session: &SessionContext,
        flow: &str,
        skill_id: &str,
        parameters: &Value,
    ) -> Result<Option<String>, FlowError> {
        session.ensure_valid()?;
        if !self.lock_editor().store().contains_flow(flow) {
            return Err(FlowError::UnknownFlow(flow.to_string()));
        }

        let lock = self.flow_lock(flow);
        let _guard = lock.lock().await;
        let fragment = instrument_request("generate_skill", || self.skills.generate(skill_id, parameters)).await?;
        session.ensure_valid()?;

        let mut editor = self.lock_editor();
        let insertion = SkillCompiler::insert_fragment(editor.store(), flow, &fragment)?;
        let entry = insertion.entry(&fragment).map(str::to_string);
        editor.commit(insertion.command);
        info!("Inserted skill {} into {} ({} nodes)", skill_id, flow, fragment.nodes.len());
        Ok(entry)
    }
}
