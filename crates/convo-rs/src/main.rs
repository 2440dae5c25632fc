//! Command-line entry point for the Convo memory service.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use convo_rs::config::{ConvoConfig, LayeredConfigOptions};
use convo_rs::server::{MemoryServer, manager_from_config};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line options for the memory service.
#[derive(Debug, Parser)]
#[command(name = "convo", version, about = "Per-user conversation memory service")]
struct Cli {
    /// Optional path to a convo.json5 config file, applied above user and cwd layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service and background expiry sweep
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Purge users inactive for longer than the expiry window
    Sweep,
    /// Print usage statistics for a user
    Stats { user_id: String },
    /// Print the context window for a user
    Context { user_id: String },
    /// Delete everything stored for a user
    Clear { user_id: String },
    /// List stored users
    Users,
}

#[derive(Serialize)]
struct ClearOutput<'a> {
    user_id: &'a str,
    cleared: bool,
}

/// Entry point for the Convo CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    convo_rs::init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    info!(
        "config loaded (path={}, max_messages={}, expire_days={})",
        config.memory.path, config.memory.max_messages_per_user, config.memory.expire_days
    );

    match cli.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Sweep => {
            let report = manager_from_config(&config)?.sweep_expired(Utc::now()).await?;
            print_json(&report)
        }
        Command::Stats { user_id } => {
            print_json(&manager_from_config(&config)?.get_stats(&user_id).await?)
        }
        Command::Context { user_id } => {
            print_json(&manager_from_config(&config)?.get_context(&user_id).await?)
        }
        Command::Clear { user_id } => {
            let cleared = manager_from_config(&config)?.clear(&user_id).await?;
            print_json(&ClearOutput {
                user_id: &user_id,
                cleared,
            })
        }
        Command::Users => print_json(&manager_from_config(&config)?.list_users().await?),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ConvoConfig> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let mut options = LayeredConfigOptions::new(cwd);
    if let Some(path) = path {
        options = options.with_runtime_path(path);
    }
    let layered =
        ConvoConfig::load_layered_with_options(options).context("failed to load configuration")?;
    Ok(layered.config)
}

async fn serve(
    mut config: ConvoConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let manager = manager_from_config(&config)?;
    let server = MemoryServer::new(config.server, config.sweep, manager);
    server.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
