use super::commands::{AuthCommands, QueryCommands};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dynamics-webapi")]
#[command(about = "Query the Microsoft Dynamics 365 Web API")]
pub struct Cli {
    /// Read credentials from this .env file instead of the environment
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Acquire an access token and show its expiry
    Auth(AuthCommands),
    /// Stream records of an entity set as JSON lines
    Query(QueryCommands),
}
