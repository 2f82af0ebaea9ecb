pub mod auth;
pub mod query;

pub use auth::{AuthCommands, auth_command};
pub use query::{QueryCommands, query_command};

use anyhow::Result;
use dynamics_webapi::auth::ClientCredentials;
use dynamics_webapi::config::Config;
use std::path::Path;

/// Resolve credentials and config shared by every command
pub fn load_context(env_file: Option<&Path>, config: Option<&Path>) -> Result<(ClientCredentials, Config)> {
    let credentials = match env_file {
        Some(path) => ClientCredentials::from_env_file(path)?,
        None => ClientCredentials::from_env()?,
    };
    let config = match config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok((credentials, config))
}
