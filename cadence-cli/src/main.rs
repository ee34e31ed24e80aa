//! Cadence CLI — local driver for the chat command pipeline.
//!
//! Runs a single message or reads messages from stdin, dispatching them
//! through the pipeline with in-memory collaborators and demo commands.

mod commands;
mod demo;
mod repl;
mod terminal;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Cadence: run chat bot commands from your terminal
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Message to send (reads messages from stdin if omitted)
    message: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Platform id of the user sending messages
    #[arg(short, long, default_value = "1")]
    user: String,

    /// Server the messages are sent in
    #[arg(short, long, default_value = demo::LOCAL_GUILD)]
    guild: String,

    /// Send as direct messages instead of in a server
    #[arg(long)]
    dm: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List the visible demo commands
    List,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Where to write it
        #[arg(default_value = "cadence.toml")]
        path: PathBuf,
    },
    /// Show the effective configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "cadence", "cadence")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cadence.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    if let Some(command) = cli.command {
        return commands::handle_command(command, cli.config.as_deref()).await;
    }

    let config = cadence_core::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if !cli.quiet {
        for warning in config.validate() {
            eprintln!("warning: {}", warning);
        }
    }

    let guild = (!cli.dm).then(|| cli.guild.clone());
    let session = repl::Session::new(&cli.user, guild);

    match cli.message {
        Some(message) => repl::run_single(&message, config, session, cli.quiet).await,
        None => repl::run_interactive(config, session, cli.quiet).await,
    }
}
