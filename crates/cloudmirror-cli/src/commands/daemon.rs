//! Daemon management commands
//!
//! Provides the `cloudmirror daemon` CLI subcommands for controlling the
//! `cloudmirrord` background service via its systemd user unit.
//!
//! # Subcommands
//!
//! - `start`   - Start the daemon service
//! - `stop`    - Stop the daemon service (waits for running syncs)
//! - `status`  - Show daemon status
//! - `restart` - Restart the daemon service

use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Service unit name for the CloudMirror daemon
const SYSTEMD_UNIT: &str = "cloudmirror";

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the CloudMirror daemon
    Start,
    /// Stop the CloudMirror daemon
    Stop,
    /// Show daemon status
    Status,
    /// Restart the CloudMirror daemon
    Restart,
}

impl DaemonCommand {
    /// Execute the selected daemon subcommand
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            DaemonCommand::Start => control(format, "start", "started"),
            DaemonCommand::Stop => control(format, "stop", "stopped"),
            DaemonCommand::Status => daemon_status(format),
            DaemonCommand::Restart => control(format, "restart", "restarted"),
        }
    }
}

fn systemctl(action: &str) -> Result<std::process::Output> {
    Command::new("systemctl")
        .args(["--user", action, SYSTEMD_UNIT])
        .output()
        .context("Failed to execute systemctl. Is systemd available?")
}

fn unit_missing(stderr: &str) -> bool {
    stderr.contains("not found") || stderr.contains("No such file")
}

fn print_install_hint(formatter: &dyn OutputFormatter) {
    formatter.info("Hint: The systemd unit file may not be installed.");
    formatter.info("Copy config/cloudmirror.service to ~/.config/systemd/user/cloudmirror.service");
    formatter.info("Then run: systemctl --user daemon-reload");
}

// ============================================================================
// daemon start / stop / restart
// ============================================================================

/// Runs `systemctl --user <action> cloudmirror` and reports the result
fn control(format: OutputFormat, action: &str, done: &str) -> Result<()> {
    let formatter = get_formatter(format.is_json());

    info!(action, "Controlling cloudmirrord via systemctl");
    let output = systemctl(action)?;

    if output.status.success() {
        formatter.reply(
            &format!("CloudMirror daemon {done}"),
            &serde_json::json!({
                "action": action,
                "success": true,
            }),
        );
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "action": action,
            "success": false,
            "error": stderr.trim(),
        }));
    } else if unit_missing(&stderr) {
        print_install_hint(&*formatter);
    }
    bail!("Failed to {action} daemon: {}", stderr.trim())
}

// ============================================================================
// daemon status
// ============================================================================

/// Summarizes `systemctl status` output as running/failed/stopped/unknown
fn parse_unit_state(stdout: &str) -> &'static str {
    if stdout.contains("active (running)") {
        "running"
    } else if stdout.contains("failed") {
        "failed"
    } else if stdout.contains("inactive (dead)") {
        "stopped"
    } else {
        "unknown"
    }
}

/// Shows the daemon status
///
/// Runs `systemctl --user status cloudmirror` and displays the output.
fn daemon_status(format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format.is_json());

    info!("Querying cloudmirrord status via systemctl");
    let output = systemctl("status")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let state = parse_unit_state(&stdout);

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "action": "status",
            "status": state,
            "active": state == "running",
            "details": stdout.trim(),
        }));
        return Ok(());
    }

    match state {
        "running" => formatter.success("CloudMirror daemon is running"),
        "failed" => formatter.error("CloudMirror daemon has failed"),
        "stopped" => formatter.info("CloudMirror daemon is stopped"),
        _ => formatter.info("CloudMirror daemon status is unknown"),
    }

    if !stdout.is_empty() {
        formatter.info("");
        for line in stdout.lines() {
            formatter.info(line);
        }
    }

    // systemctl status exits non-zero for inactive units too
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() && unit_missing(&stderr) {
        formatter.info("");
        print_install_hint(&*formatter);
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
