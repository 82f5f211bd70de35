use chrono::Utc;
use clap::{Parser, Subcommand};

pub mod flow;
pub mod schema;
pub mod skill;

use flow::FlowArgs;
use schema::SchemaArgs;
use skill::SkillArgs;

use flowstudio::{
    config::EditorConfig,
    session::SessionContext,
    workspace::Workspace,
};

#[derive(Parser, Debug)]
#[command(
    name = "flowstudio",
    about = "Edit, check and extend conversational flows",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage flows
    Flow(FlowArgs),

    /// List and generate skills
    Skill(SkillArgs),

    /// Emit JSON-Schema into `<root>/schemas`
    Schema(SchemaArgs),
}

#[derive(Clone, Debug)]
pub struct CliContext {
    pub config: EditorConfig,
}

impl CliContext {
    pub fn new(config: EditorConfig) -> Self {
        Self { config }
    }

    pub fn session(&self) -> SessionContext {
        SessionContext::new("cli", Utc::now(), self.config.session_ttl)
    }

    /// A workspace over `<root>/flows`, already loaded.
    pub async fn workspace(&self, session: &SessionContext) -> anyhow::Result<Workspace> {
        let workspace = Workspace::from_config(&self.config)?;
        workspace.init(session).await?;
        Ok(workspace)
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Flow(args) => flow::execute(args, context).await,
        Commands::Skill(args) => skill::execute(args, context).await,
        Commands::Schema(args) => schema::execute(args, context).await,
    }
}
