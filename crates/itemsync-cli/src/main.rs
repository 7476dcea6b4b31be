//! itemsync CLI
//!
//! Command-line view over a remote item collection, with optimistic
//! updates applied locally before the item store confirms them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use itemsync_core::{Config, HttpRemoteStore, RemoteStore, RollbackPolicy};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "itemsync")]
#[command(about = "itemsync - optimistic client for a remote item collection")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Item store base URL (overrides config and ITEMSYNC_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Rollback policy for failed mutations (snapshot, per_item)
    #[arg(long, global = true)]
    rollback: Option<RollbackPolicy>,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all items
    #[command(alias = "ls")]
    List,
    /// Add an item
    Add {
        /// Item value
        value: String,
    },
    /// Change an item's value
    Update {
        /// Item ID (full ID or unique prefix)
        id: String,
        /// New value
        value: String,
    },
    /// Remove an item
    #[command(alias = "rm")]
    Remove {
        /// Item ID (full ID or unique prefix)
        id: String,
    },
    /// Fetch the collection from the item store
    Reload,
    /// Interactive shell with overlapping operations
    Shell,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, rollback)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, &output).await {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_deref();

    // Config commands work on the file itself, without CLI overrides
    if let Commands::Config { command } = cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, output)
            }
        };
    }

    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(rollback) = cli.rollback {
        config.rollback = rollback;
    }

    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(&config)?);
    tracing::debug!(api_url = %config.api_url, rollback = %config.rollback, "using item store");

    match cli.command {
        Commands::List => commands::items::list(remote, &config, output).await,
        Commands::Add { value } => commands::items::add(remote, &config, value, output).await,
        Commands::Update { id, value } => {
            commands::items::update(remote, &config, id, value, output).await
        }
        Commands::Remove { id } => commands::items::remove(remote, &config, id, output).await,
        Commands::Reload => commands::items::reload(remote, &config, output).await,
        Commands::Shell => commands::shell::run(remote, &config, output).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize logging to stderr
///
/// The level comes from ITEMSYNC_LOG (default: warn).
fn init_logging() {
    let log_level = std::env::var("ITEMSYNC_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::new(format!(
        "itemsync_core={},itemsync_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
