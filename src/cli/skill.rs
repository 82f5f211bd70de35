use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::Value;

use super::CliContext;

#[derive(Args, Debug)]
pub struct SkillArgs {
    #[command(subcommand)]
    pub command: SkillCommands,
}

#[derive(Subcommand, Debug)]
pub enum SkillCommands {
    /// List the skills found in `<root>/skills`
    List,
    /// Insert a skill into a flow and save
    Generate {
        id: String,
        /// Target flow
        #[arg(long)]
        flow: String,
        /// Skill parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

pub async fn execute(args: SkillArgs, context: &CliContext) -> anyhow::Result<()> {
    let session = context.session();
    let workspace = context.workspace(&session).await?;
    match args.command {
        SkillCommands::List => {
            for skill in workspace.list_skills(&session).await? {
                println!("{}\t{}", skill.id, skill.name);
            }
            Ok(())
        }
        SkillCommands::Generate { id, flow, params } => {
            let params: Value = serde_json::from_str(&params).context("--params is not valid JSON")?;
            let entry = workspace.insert_skill(&session, &flow, &id, &params).await?;
            workspace.save_all(&session).await?;
            match entry {
                Some(entry) => println!("✅ Skill `{}` inserted into `{}` at `{}`", id, flow, entry),
                None => println!("Skill `{}` produced no nodes", id),
            }
            Ok(())
        }
    }
}
