//! TreZapalooza Discord bridge
//!
//! Binds Discord threads to Archipelago rooms:
//! - `/connect` logs into a room and opens a thread for it
//! - thread messages are sent to the room as `author: text`
//! - room chat is posted back into the thread
//!
//! Usage: `trezapalooza-bridge [config.json] [--token TOKEN]`

mod cli;
mod config;

use anyhow::{Context, Result};
use archipelago_bridge::{ArchipelagoConfig, ArchipelagoConnector};
use chat_relay_server::{ControllerConfig, RelayServer};
use clap::Parser;
use cli::Cli;
use config::BridgeConfig;
use discord_bridge::{DiscordBot, DiscordPlatform, DiscordRest, GatewayConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Platform events buffered ahead of the dispatcher
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(Cli::parse())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        "{} bridge starting (default host {})",
        config.server_label, config.default_host
    );

    let connector = Arc::new(ArchipelagoConnector::new(ArchipelagoConfig {
        connect_timeout: config.connect_timeout,
        ..ArchipelagoConfig::default()
    }));
    let rest = Arc::new(DiscordRest::new(config.token.clone()));
    let platform = Arc::new(DiscordPlatform::new(rest.clone()));

    let server = RelayServer::new(
        connector,
        platform,
        ControllerConfig {
            default_host: config.default_host.clone(),
            server_label: config.server_label.clone(),
        },
    );
    let bot = DiscordBot::new(
        rest,
        GatewayConfig::new(config.token.clone()),
        vec![server.connect_command()],
    );

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

    let relay = tokio::spawn(server.run(events_rx, shutdown.clone()));
    let discord = tokio::spawn(bot.run(events_tx, shutdown.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupt received, shutting down");
        }
        result = wait_for(discord) => {
            if let Err(e) = result {
                error!("Discord connection failed: {:#}", e);
            }
        }
    }

    shutdown.cancel();
    relay.await?;
    info!("Bridge stopped");
    Ok(())
}

fn load_config(cli: Cli) -> Result<BridgeConfig> {
    BridgeConfig::load(&cli.config, cli.token)
        .with_context(|| format!("Failed to load {}", cli.config.display()))
}

async fn wait_for(task: tokio::task::JoinHandle<chat_relay_core::Result<()>>) -> Result<()> {
    task.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_config_is_an_error() {
        let cli = Cli {
            config: PathBuf::from("/nonexistent/config.json"),
            token: Some("abc".into()),
        };

        let err = load_config(cli).unwrap_err();
        assert_eq!(err.to_string(), "Failed to load /nonexistent/config.json");
        let cause = format!("{:#}", err);
        assert!(cause.contains("Error reading config.json"));
    }
}
