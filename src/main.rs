use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flasharb::application::{Cli, CommandExecutor};
use flasharb::shared::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    CommandExecutor::execute(cli.command, config).await?;
    Ok(())
}
