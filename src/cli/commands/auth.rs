use anyhow::{Context, Result};
use clap::Args;
use dynamics_webapi::auth::ClientCredentials;
use dynamics_webapi::config::Config;
use log::info;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct AuthCommands {
    /// Also print the raw access token
    #[arg(long)]
    pub show_token: bool,
}

pub async fn auth_command(
    args: AuthCommands,
    credentials: &ClientCredentials,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("Executing auth command");

    let client = config.client(credentials)?;
    let token = client
        .auth()
        .acquire(cancel)
        .await
        .context("Failed to acquire access token")?;

    println!("Host: {}", credentials.base_url());
    println!("Client ID: {}", credentials.client_id);
    println!("Token type: {}", token.token_type());
    println!("Expires at: {}", token.expires_at().to_rfc3339());
    if args.show_token {
        println!("Access token: {}", token.access_token());
    }

    Ok(())
}
