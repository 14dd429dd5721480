//! CLI entry point for agent-relay

mod client;

use agent_relay_core::config::validate::validate_config;
use agent_relay_core::config::{Config, ConfigLoader};
use agent_relay_core::logging::init_logging;
use agent_relay_server::{run_server, AppState};
use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{ApiClient, ChatEvent};
use console::style;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "agent-relay")]
#[command(about = "Streaming chat relay with out-of-band stop signals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Server base URL for client commands
    #[arg(short, long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Stream a reply from a running server
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Conversation id; a new one is generated when omitted
        #[arg(long)]
        chat_id: Option<String>,
    },
    /// Stop the active response of a conversation
    Stop {
        /// Conversation id
        chat_id: String,
    },
    /// Show server health
    Health,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Serve => run_serve(&config_loader).await,
        Commands::Chat { message, chat_id } => {
            init_client_logging();
            let chat_id = chat_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            run_chat(ApiClient::new(cli.server), &chat_id, &message).await
        }
        Commands::Stop { chat_id } => {
            init_client_logging();
            let status = ApiClient::new(cli.server).stop(&chat_id).await?;
            println!("{} {}", style(&chat_id).cyan(), style(status).green());
            Ok(())
        }
        Commands::Health => {
            init_client_logging();
            let report = ApiClient::new(cli.server).health().await?;
            let status = if report.status == "healthy" {
                style(report.status).green()
            } else {
                style(report.status).yellow()
            };
            println!("status: {}\nredis:  {}", status, report.redis);
            Ok(())
        }
        Commands::Config => {
            let config = config_loader.load()?;
            println!("{}", serde_json::to_string_pretty(&masked(config))?);
            Ok(())
        }
    }
}

/// Stderr-only logging for short-lived client commands
fn init_client_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_serve(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    validate_config(&config)?;
    let _log_guard = init_logging(&config.logging);

    println!("{}", style("Starting agent-relay...").bold().cyan());
    info!(
        "Config: model={} signal={:?}@{} sessions={}",
        config.model.model,
        config.signal.backend,
        config.signal.redis_url(),
        config.session.dir
    );
    if config.model.api_key.is_empty() {
        warn!("No API key configured; set GEMINI_API_KEY");
    }

    let state = AppState::from_config(config)?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{}", style("Shutting down...").yellow());
            let _ = shutdown_tx.send(());
        }
    });

    run_server(state, shutdown_rx).await?;
    println!("{}", style("Server stopped.").green());
    Ok(())
}

async fn run_chat(client: ApiClient, chat_id: &str, message: &str) -> Result<()> {
    println!("{} {}", style("chat_id:").dim(), chat_id);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let chat = client.chat(chat_id, message, event_tx);
    let print = async {
        let mut stdout = std::io::stdout();
        while let Some(event) = event_rx.recv().await {
            match event {
                ChatEvent::Delta(text) => {
                    print!("{}", text);
                    let _ = stdout.flush();
                }
                ChatEvent::Stopped => println!("\n{}", style("[STOPPED]").yellow()),
                ChatEvent::Error(message) => {
                    println!("\n{} {}", style("error:").red().bold(), message)
                }
            }
        }
    };

    let (result, ()) = tokio::join!(chat, print);
    println!();
    result
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

fn masked(mut config: Config) -> Config {
    config.model.api_key = mask_secret(&config.model.api_key);
    config
}
