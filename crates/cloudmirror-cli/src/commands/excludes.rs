//! Excludes command - Manage exclude patterns
//!
//! Changes apply from the next bisync invocation and are written to the
//! daemon's config file.

use anyhow::Result;
use clap::Subcommand;
use cloudmirror_ipc::CloudMirrorClient;
use serde_json::Value;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ExcludesCommand {
    /// List active exclude patterns
    List,
    /// Add an exclude pattern (rclone filter glob)
    Add {
        /// Pattern, e.g. `*.iso` or `node_modules/**`
        pattern: String,
    },
    /// Remove an exclude pattern
    Remove {
        pattern: String,
    },
}

impl ExcludesCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;

        let (message, reply) = match self {
            ExcludesCommand::List => {
                let reply = client.list_excludes().await?;
                let count = patterns(&reply).len();
                (format!("{count} exclude patterns"), reply)
            }
            ExcludesCommand::Add { pattern } => {
                let reply = client.add_exclude(pattern).await?;
                (format!("Added exclude pattern {pattern}"), reply)
            }
            ExcludesCommand::Remove { pattern } => {
                let reply = client.remove_exclude(pattern).await?;
                (format!("Removed exclude pattern {pattern}"), reply)
            }
        };

        formatter.reply(&message, &reply);
        if format.is_json() {
            return Ok(());
        }

        if reply["persisted"].as_bool() == Some(false) {
            formatter.warn("Change is active but could not be written to the config file");
        }
        for pattern in patterns(&reply) {
            formatter.info(pattern);
        }
        Ok(())
    }
}

fn patterns(reply: &Value) -> Vec<&str> {
    reply["excludes"]
        .as_array()
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
