use clap::Args;

use super::CliContext;
use flowstudio::schema::write_schema;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Output directory, `<root>/schemas` when omitted
    #[arg(long)]
    pub out_dir: Option<std::path::PathBuf>,
}

pub async fn execute(args: SchemaArgs, context: &CliContext) -> anyhow::Result<()> {
    let out_dir = args.out_dir.unwrap_or_else(|| context.config.schemas_dir());
    write_schema(&out_dir)?;
    println!("Schemas written to {}", out_dir.display());
    Ok(())
}
