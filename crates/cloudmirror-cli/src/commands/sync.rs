//! Sync commands - Queue syncs and force resyncs
//!
//! - `cloudmirror sync PATH` queues one directory
//! - `cloudmirror sync --all` queues every registered directory
//! - `cloudmirror resync PATH` rebuilds a directory's bisync state from the
//!   local side, pushing local deletions to the remote first
//!
//! Syncs run in the daemon; these commands return once the request is
//! accepted. Follow progress with `cloudmirror status`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use cloudmirror_ipc::CloudMirrorClient;
use tracing::info;

use super::absolute_path;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Registered directory to sync
    #[arg(conflicts_with = "all")]
    pub path: Option<PathBuf>,

    /// Sync every registered directory
    #[arg(long)]
    pub all: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;

        match (&self.path, self.all) {
            (_, true) => {
                info!("Requesting sync of all directories");
                let reply = client.sync_all().await?;
                let queued = reply["queued"].as_u64().unwrap_or(0);
                formatter.reply(&format!("Queued {queued} directories"), &reply);
            }
            (Some(path), false) => {
                let path = absolute_path(path)?;
                info!(path = %path, "Requesting sync");
                let reply = client.sync_one(&path).await?;
                let directory = reply["directory"].as_str().unwrap_or(&path);
                formatter.reply(&format!("Queued {directory}"), &reply);
            }
            (None, false) => bail!("Specify a directory or --all"),
        }

        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ResyncCommand {
    /// Registered directory to resync
    pub path: PathBuf,
}

impl ResyncCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;

        let path = absolute_path(&self.path)?;
        info!(path = %path, "Requesting forced resync");
        let reply = client.force_resync(&path).await?;

        formatter.reply(&format!("Forced resync of {path} started"), &reply);
        formatter.info("Local state wins; run 'cloudmirror status' to follow it");
        Ok(())
    }
}
