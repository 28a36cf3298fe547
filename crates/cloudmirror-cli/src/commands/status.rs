//! Status command - Display per-directory sync status
//!
//! Provides the `cloudmirror status` CLI command which shows whether the
//! orchestrator is running, how many syncs are queued, and for every
//! registered directory its status, remote, last successful sync and last
//! error.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use cloudmirror_ipc::CloudMirrorClient;
use serde_json::Value;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;
        let status = client.status().await?;

        if format.is_json() {
            formatter.print_json(&status);
            return Ok(());
        }

        let running = status["running"].as_bool().unwrap_or(false);
        let queued = status["queue_size"].as_u64().unwrap_or(0);
        if running {
            formatter.success(&format!("Orchestrator running, {queued} queued"));
        } else {
            formatter.warn("Orchestrator stopped");
        }

        let directories = status["directories"].as_array().cloned().unwrap_or_default();
        if directories.is_empty() {
            formatter.info("No directories registered");
            return Ok(());
        }

        let now = Utc::now();
        formatter.info("");
        for directory in &directories {
            for line in describe_directory(directory, now) {
                formatter.info(&line);
            }
        }

        Ok(())
    }
}

/// Lines shown for one directory entry
fn describe_directory(directory: &Value, now: DateTime<Utc>) -> Vec<String> {
    let status = directory["status"].as_str().unwrap_or("unknown");
    let marker = match status {
        "idle" => "\u{2713}",
        "syncing" => "\u{21bb}",
        "error" => "\u{2717}",
        _ => "?",
    };
    let local = directory["local_path"].as_str().unwrap_or("?");
    let remote = directory["remote_path"].as_str().unwrap_or("?");

    let mut lines = vec![format!("{marker} {local} \u{2194} {remote} [{status}]")];

    let last_sync = directory["last_sync"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| format_age(t.with_timezone(&Utc), now));
    match last_sync {
        Some(age) => lines.push(format!("    last sync: {age}")),
        None if directory["needs_initial_sync"].as_bool() == Some(true) => {
            lines.push("    last sync: never (initial resync pending)".to_string());
        }
        None => lines.push("    last sync: never".to_string()),
    }

    if let Some(error) = directory["last_error"].as_str() {
        let failures = directory["consecutive_failures"].as_u64().unwrap_or(0);
        lines.push(format!("    last error ({failures} in a row): {error}"));
    }

    lines
}

/// Coarse "how long ago" text
fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
