//! Command lines for the rclone invocations the orchestrator issues
//!
//! Only argument construction lives here. Running the commands is the job of
//! a [`CommandRunner`](cloudmirror_process::CommandRunner) and interpreting
//! bisync output is the job of [`classify`](crate::classify).

use std::{path::PathBuf, time::Duration};

use cloudmirror_core::{
    config::{expand_tilde, RcloneConfig},
    domain::{ExcludeRules, SyncDirectory},
};
use cloudmirror_process::CommandSpec;

/// Safety flags passed to every bisync run
pub const BISYNC_FLAGS: &[&str] = &[
    "--resilient",
    "--recover",
    "--conflict-resolve",
    "newer",
    "--conflict-loser",
    "num",
    "--create-empty-src-dirs",
    "--skip-links",
];

/// Builds rclone command lines from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcloneTool {
    binary: String,
    work_dir: PathBuf,
    max_transfer: String,
    transfers: u32,
    checkers: u32,
    mkdir_timeout: Duration,
    probe_timeout: Duration,
}

impl RcloneTool {
    pub fn from_config(config: &RcloneConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            work_dir: expand_tilde(&config.workdir),
            max_transfer: config.max_transfer.clone(),
            transfers: config.transfers,
            checkers: config.checkers,
            mkdir_timeout: Duration::from_secs(config.mkdir_timeout),
            probe_timeout: Duration::from_secs(config.probe_timeout),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// The bisync working directory holding lock and listing files
    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    /// `rclone bisync` for `directory`, with `--resync` when `resync` is set
    ///
    /// No timeout: a large initial sync may legitimately run for hours.
    pub fn bisync(&self, directory: &SyncDirectory, excludes: &ExcludeRules, resync: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .arg("bisync")
            .arg(directory.local_path().to_string_lossy())
            .arg(directory.remote_path())
            .arg("--workdir")
            .arg(self.work_dir.to_string_lossy())
            .args(BISYNC_FLAGS.iter().copied())
            .arg("--max-transfer")
            .arg(&self.max_transfer)
            .arg("--transfers")
            .arg(self.transfers.to_string())
            .arg("--checkers")
            .arg(self.checkers.to_string());

        for pattern in excludes.patterns() {
            spec = spec.arg("--exclude").arg(pattern);
        }
        if resync {
            spec = spec.arg("--resync");
        }
        spec
    }

    /// `rclone mkdir <remote>` with the short auxiliary timeout
    pub fn mkdir(&self, remote: &str) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg("mkdir")
            .arg(remote)
            .timeout(self.mkdir_timeout)
    }

    /// One-way `rclone sync <local> <remote>`, propagating local deletions
    pub fn push(&self, directory: &SyncDirectory, excludes: &ExcludeRules) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .arg("sync")
            .arg(directory.local_path().to_string_lossy())
            .arg(directory.remote_path())
            .arg("--skip-links")
            .arg("--transfers")
            .arg(self.transfers.to_string())
            .arg("--checkers")
            .arg(self.checkers.to_string());
        for pattern in excludes.patterns() {
            spec = spec.arg("--exclude").arg(pattern);
        }
        spec
    }

    /// `rclone listremotes`
    pub fn list_remotes(&self) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg("listremotes")
            .timeout(self.probe_timeout)
    }

    /// `rclone lsd <remote>: --max-depth 1`, a cheap reachability probe
    pub fn probe(&self, remote_name: &str) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg("lsd")
            .arg(format!("{remote_name}:"))
            .args(["--max-depth", "1"])
            .timeout(self.probe_timeout)
    }
}
