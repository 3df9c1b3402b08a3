//! Roster CLI - contributor profile tools.
//!
//! The main entry point for the `roster` binary.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use roster_core::Config;
use roster_profiles::ToolRequest;

use roster_cli::commands::{self, serve, tools};
use roster_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    roster_core::init_logging(config.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli, &config))
}

async fn run(cli: Cli, config: &Config) -> Result<()> {
    if let Some(addr) = config.metrics_addr {
        roster_cli::metrics::init_metrics(addr)?;
    }
    let store = Arc::new(commands::open_store(config, cli.in_memory).await?);
    let result = match cli.command {
        Commands::Serve => serve::execute(Arc::clone(&store)).await,
        Commands::ListUsernames => tools::execute(&store, ToolRequest::ListUsernames).await,
        Commands::AddProfile(args) => tools::execute(&store, args.into()).await,
        Commands::Reclassify(args) => tools::execute(&store, args.into()).await,
        Commands::UpdateProfile(args) => tools::execute(&store, args.into()).await,
        Commands::CleanMetadata(args) => tools::execute(&store, args.into()).await,
    };
    store.sessions().close().await;
    result
}
