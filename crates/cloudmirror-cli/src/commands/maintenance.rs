//! Maintenance command - Run system maintenance through the daemon
//!
//! `run` starts the configured step sequence in the background; `status`
//! shows whether one is in progress and the last report.

use anyhow::Result;
use clap::Subcommand;
use cloudmirror_ipc::CloudMirrorClient;
use serde_json::Value;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum MaintenanceCommand {
    /// Start a maintenance run now
    Run,
    /// Show progress and the last report
    Status,
}

impl MaintenanceCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let client = CloudMirrorClient::connect().await?;

        match self {
            MaintenanceCommand::Run => {
                let reply = client.run_maintenance().await?;
                let steps = reply["steps"].as_u64().unwrap_or(0);
                formatter.reply(&format!("Maintenance started ({steps} steps)"), &reply);
                formatter.info("Run 'cloudmirror maintenance status' for the report");
            }
            MaintenanceCommand::Status => {
                let reply = client.maintenance_status().await?;
                if format.is_json() {
                    formatter.print_json(&reply);
                    return Ok(());
                }
                if reply["running"].as_bool() == Some(true) {
                    formatter.info("A maintenance run is in progress");
                }
                match reply.get("last_report").filter(|r| !r.is_null()) {
                    Some(report) => {
                        for line in describe_report(report) {
                            formatter.info(&line);
                        }
                    }
                    None => formatter.info("No maintenance run has finished yet"),
                }
            }
        }
        Ok(())
    }
}

fn describe_report(report: &Value) -> Vec<String> {
    let started = report["started_at"].as_str().unwrap_or("?");
    let mut lines = vec![if report["aborted"].as_bool() == Some(true) {
        format!("Last run {started}: aborted")
    } else {
        format!("Last run {started}: completed")
    }];

    for step in report["results"].as_array().into_iter().flatten() {
        let name = step["name"].as_str().unwrap_or("?");
        let line = match step["status"].as_str() {
            Some("succeeded") => format!("  \u{2713} {name}"),
            Some("skipped") => format!("  - {name} (skipped)"),
            _ => format!(
                "  \u{2717} {name}: {}",
                step["error"].as_str().unwrap_or("failed")
            ),
        };
        lines.push(line);
    }
    lines
}
