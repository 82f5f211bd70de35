use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Subcommand};
use serde_json::Value;

use super::CliContext;
use flowstudio::{
    flow::{
        model::Flow,
        naming::validate_flow_name,
        transition::{TransitionResolver, dangling_links},
    },
    storage::FileFlowStorage,
};

#[derive(Args, Debug)]
pub struct FlowArgs {
    #[command(subcommand)]
    pub command: FlowCommands,
}

#[derive(Subcommand, Debug)]
pub enum FlowCommands {
    /// Check a flow file: name, start node and links
    Validate { file: PathBuf },
    /// List the flows of the workspace
    List,
    /// Create an empty flow and save it
    Create { name: String },
    /// Print where a node leads for a given context
    Resolve {
        file: PathBuf,
        node: String,
        /// JSON object whose keys are visible to conditions
        #[arg(long, default_value = "{}")]
        context: String,
    },
}

fn load_flow(file: &Path) -> anyhow::Result<Flow> {
    if !file.exists() {
        bail!("File does not exist: {}", file.display());
    }
    let doc = FileFlowStorage::load_document(file)?;
    Flow::from_document(doc).with_context(|| format!("Invalid flow file: {}", file.display()))
}

pub async fn execute(args: FlowArgs, context: &CliContext) -> anyhow::Result<()> {
    match args.command {
        FlowCommands::Validate { file } => {
            let flow = load_flow(&file)?;
            validate_flow_name(flow.name(), |_| false)?;
            if let Some(start) = flow.start_node() {
                if !flow.contains_node(start) {
                    bail!("Start node `{}` does not exist in {}", start, flow.name());
                }
            }
            let dangling = dangling_links(&flow);
            for link in &dangling {
                println!(
                    "⚠️  {} -> transition {} points at `{}`",
                    link.node,
                    link.index,
                    link.target.label()
                );
            }
            println!(
                "✅ Flow `{}` is valid ({} nodes, {} dangling links).",
                flow.name(),
                flow.nodes().len(),
                dangling.len()
            );
            Ok(())
        }
        FlowCommands::List => {
            let session = context.session();
            let workspace = context.workspace(&session).await?;
            workspace.view(|editor| {
                for name in editor.list_flows() {
                    if let Ok(flow) = editor.get_flow(&name) {
                        println!("{}\t{} nodes", flow.file_name(), flow.nodes().len());
                    }
                }
            });
            Ok(())
        }
        FlowCommands::Create { name } => {
            let session = context.session();
            let workspace = context.workspace(&session).await?;
            let name = workspace.edit(&session, |editor| editor.create_flow_from_input(&name))?;
            workspace.save_all(&session).await?;
            println!("✅ Flow `{}` created in {}", name, context.config.flows_dir().display());
            Ok(())
        }
        FlowCommands::Resolve {
            file,
            node,
            context: raw,
        } => {
            let flow = load_flow(&file)?;
            let ctx: Value = serde_json::from_str(&raw).context("--context is not valid JSON")?;
            let resolver: TransitionResolver = TransitionResolver::default();
            let target = resolver.resolve_in(&flow, &node, &ctx)?;
            println!("{}", target.label());
            Ok(())
        }
    }
}
