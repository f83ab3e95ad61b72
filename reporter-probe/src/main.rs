//! Reporter Probe - datasource bring-up and health CLI
//!
//! Reads `DATASOURCE_<NAME>_*` and `REPORTER_*` from the environment,
//! connects every datasource with retry, then:
//! - `status`: prints a health table (or JSON) and exits
//! - `watch`: runs the health checker until Ctrl-C
//! - `schemas <identity>`: prints the discovered tables of one datasource

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(&cli.log_level)?)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let probe = commands::Probe::bring_up().await?;

    let result = match cli.command.unwrap_or(Commands::Status { json: false }) {
        Commands::Status { json } => probe.status(json).await,
        Commands::Watch => probe.watch().await,
        Commands::Schemas { identity } => probe.schemas(&identity).await,
    };

    probe.shutdown().await;
    result
}
