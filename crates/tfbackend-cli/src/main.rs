mod backends;
mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            // Config loading may warn before the configured level is known.
            let bootstrap = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("warn"))
                .with_target(false)
                .finish();
            let config = tracing::subscriber::with_default(bootstrap, || {
                tfbackend_config::load_from_process_env(config.as_deref())
            })
            .context("failed to load configuration")?;

            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .with_context(|| format!("invalid log level '{}'", config.log_level))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();

            commands::serve(config).await
        }
        Command::GenerateKey => {
            commands::generate_key();
            Ok(())
        }
    }
}
