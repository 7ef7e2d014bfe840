use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pricewatch::application::{Cli, CommandExecutor};
use pricewatch::shared::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: CLI args > environment > config file > defaults
    let mut config = ConfigLoader::load(cli.config.as_deref())?;
    cli.command.apply_overrides(&mut config);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    CommandExecutor::execute(cli.command, config).await?;
    Ok(())
}
