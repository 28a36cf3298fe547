//! Orchestrator commands - Register directories and start/stop syncing

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cloudmirror_ipc::CloudMirrorClient;
use tracing::info;

use super::absolute_path;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct RegisterCommand {
    /// Existing local directory
    pub local: PathBuf,

    /// Remote path, e.g. `Documents` or `gdrive:Backup/Documents`
    ///
    /// A path without a `name:` prefix goes under the configured remote.
    pub remote: String,
}

impl RegisterCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;

        let local = absolute_path(&self.local)?;
        info!(local = %local, remote = %self.remote, "Registering directory");
        let reply = client.register(&local, &self.remote).await?;

        let directory = reply["directory"].as_str().unwrap_or(&local);
        let remote = reply["remote"].as_str().unwrap_or(&self.remote);
        formatter.reply(&format!("Registered {directory} \u{2194} {remote}"), &reply);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct StartCommand {}

impl StartCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;
        let reply = client.start().await?;
        formatter.reply("Orchestrator started", &reply);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct StopCommand {}

impl StopCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;
        formatter.info("Waiting for running syncs to finish...");
        let reply = client.stop().await?;
        formatter.reply("Orchestrator stopped", &reply);
        Ok(())
    }
}
