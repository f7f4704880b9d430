use crate::config::{DEFAULT_CONFIG_PATH, TOKEN_ENV};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "trezapalooza-bridge")]
#[command(about = "Relay chat between Discord threads and Archipelago rooms")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Discord bot token, replacing the one in the config file
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,
}
