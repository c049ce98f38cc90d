//! CLI binary for festbot.

use anyhow::Context;
use clap::{Parser, Subcommand};
use festbot::{BotConfig, ChatServer, ChatService, Credentials};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Festival food chatbot backend.
#[derive(Parser)]
#[command(name = "festbot", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides `server.host`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides `server.port`).
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chat API (default).
    Serve,

    /// Write the default configuration to the config path and exit.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal in production.
    let dotenv_loaded = dotenv::dotenv().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("festbot=info,tower_http=warn")),
        )
        .init();

    if dotenv_loaded {
        info!("loaded environment from .env");
    }

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(BotConfig::default_config_path);

    match cli.command {
        Some(Command::InitConfig { force }) => init_config(&config_path, force),
        Some(Command::Serve) | None => {
            let mut config = load_config(&config_path, cli.config.is_some())?;
            if let Some(host) = cli.host {
                config.server.host = host;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            serve(config).await
        }
    }
}

/// Load the config file. An explicitly named file must exist; the default
/// location is optional.
fn load_config(path: &std::path::Path, explicit: bool) -> anyhow::Result<BotConfig> {
    if explicit || path.exists() {
        let config = BotConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        info!("config loaded from {}", path.display());
        Ok(config)
    } else {
        info!("no config at {}, using defaults", path.display());
        Ok(BotConfig::default())
    }
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    BotConfig::default()
        .save_to_file(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn serve(config: BotConfig) -> anyhow::Result<()> {
    println!("festbot v{}", env!("CARGO_PKG_VERSION"));

    let credentials = Credentials::from_env(&config);
    let server_config = config.server.clone();
    let event = config.persona.event.clone();

    let service = Arc::new(ChatService::new(config, credentials)?);
    if !service.llm_configured() {
        warn!("starting without LLM credentials; /chat will answer with the apology");
    }

    let mut server = ChatServer::start(Arc::clone(&service), &server_config).await?;
    println!("\n{event} chatbot ready on http://{}. Press Ctrl+C to stop.\n", server.addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down...");
    server.shutdown().await;
    Ok(())
}
