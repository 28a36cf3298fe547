//! CloudMirror CLI - Command-line interface for CloudMirror
//!
//! Provides commands for:
//! - Registering directories and triggering syncs
//! - Viewing per-directory sync status
//! - Managing exclude patterns
//! - Running system maintenance
//! - Controlling the daemon
//!
//! Everything except `daemon`, `config` and `completions` talks to the
//! running `cloudmirrord` over D-Bus.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand,
    config::ConfigCommand,
    daemon::DaemonCommand,
    excludes::ExcludesCommand,
    maintenance::MaintenanceCommand,
    orchestrator::{RegisterCommand, StartCommand, StopCommand},
    status::StatusCommand,
    sync::{ResyncCommand, SyncCommand},
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "cloudmirror",
    version,
    about = "Bidirectional directory mirroring with rclone"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file (config subcommands only)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the status of every registered directory
    Status(StatusCommand),
    /// Queue a sync for one directory or all of them
    Sync(SyncCommand),
    /// Rebuild a directory's sync state from the local side
    Resync(ResyncCommand),
    /// Register a local directory with a remote path
    Register(RegisterCommand),
    /// Start the orchestrator in the running daemon
    Start(StartCommand),
    /// Stop the orchestrator, waiting for running syncs
    Stop(StopCommand),
    /// Manage exclude patterns
    #[command(subcommand)]
    Excludes(ExcludesCommand),
    /// Run or inspect system maintenance
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),
    /// Manage the CloudMirror background daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),
    /// View and check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config_path = cli.config.clone();

    let result = match cli.command {
        Commands::Status(cmd) => cmd.execute(format).await,
        Commands::Sync(cmd) => cmd.execute(format).await,
        Commands::Resync(cmd) => cmd.execute(format).await,
        Commands::Register(cmd) => cmd.execute(format).await,
        Commands::Start(cmd) => cmd.execute(format).await,
        Commands::Stop(cmd) => cmd.execute(format).await,
        Commands::Excludes(cmd) => cmd.execute(format).await,
        Commands::Maintenance(cmd) => cmd.execute(format).await,
        Commands::Daemon(cmd) => cmd.execute(format).await,
        Commands::Config(cmd) => cmd.execute(format, config_path).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    };

    if let Err(e) = result {
        get_formatter(cli.json).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
