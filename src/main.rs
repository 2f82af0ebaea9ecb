use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

mod cli;

use cli::commands::{auth_command, load_context, query_command};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    info!("Starting dynamics-webapi");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            on_interrupt.cancel();
        }
    });

    let (credentials, config) = load_context(cli.env_file.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Auth(args) => auth_command(args, &credentials, &config, &cancel).await,
        Commands::Query(args) => {
            let client = config.client(&credentials)?;
            query_command(args, &client, &cancel).await
        }
    }
}
