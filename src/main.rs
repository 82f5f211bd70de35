use clap::Parser;
use flowstudio::{
    config::{ConfigManager, EditorConfig, EnvConfigManager, ROOT_KEY},
    logger::init_tracing,
};
use std::{env, path::PathBuf};
use tracing::info;

mod cli;

use cli::{Cli, CliContext};

/// Resolve the workspace root from the environment or use the default.
pub fn resolve_root_dir() -> PathBuf {
    match env::var(ROOT_KEY) {
        Ok(path) => PathBuf::from(path),
        Err(_) => EditorConfig::default().root,
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = resolve_root_dir();
    let config_manager = ConfigManager::new(EnvConfigManager::new(root.join(".env")));
    let mut config = EditorConfig::from_manager(&config_manager).await;
    config.root = root;

    if let Err(err) = init_tracing(&config.logs_dir(), &config.log_level) {
        eprintln!("logging disabled: {err:#}");
    }
    info!("flowstudio using {}", config.root.display());

    let context = CliContext::new(config);
    cli::execute(&context, cli.command).await
}
