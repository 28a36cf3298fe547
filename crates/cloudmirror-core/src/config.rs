//! Configuration module for CloudMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::exclude::{ExcludeRules, DEFAULT_EXCLUDES};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for CloudMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub rclone: RcloneConfig,
    pub logging: LoggingConfig,
    pub maintenance: MaintenanceConfig,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the rclone remote, e.g. `gdrive` (a trailing `:` is accepted).
    pub remote: String,
    /// Seconds between periodic re-enqueues of every directory.
    pub poll_interval_secs: u64,
    /// Milliseconds between queue-processor ticks.
    pub tick_interval_ms: u64,
    /// Upper bound on directories syncing at once; `0` means unbounded.
    pub max_concurrent_syncs: u32,
    /// Directory pairs. Empty means the well-known user directories.
    pub directories: Vec<DirectoryConfig>,
    /// Glob patterns passed as `--exclude` to every invocation.
    pub excludes: Vec<String>,
}

/// One configured directory pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Local directory; `~` is expanded at runtime.
    pub local: PathBuf,
    /// Remote path. Without a `remote:` prefix it is taken relative to `sync.remote`.
    pub remote: String,
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RcloneConfig {
    /// rclone executable name or path.
    pub binary: String,
    /// bisync working directory holding lock and listing files.
    pub workdir: PathBuf,
    /// Per-run transfer cap in rclone size syntax (`50G`, `500M`, ...).
    pub max_transfer: String,
    /// Parallel file transfers.
    pub transfers: u32,
    /// Parallel checkers.
    pub checkers: u32,
    /// Timeout in seconds for `rclone mkdir`.
    pub mkdir_timeout: u64,
    /// Timeout in seconds for the startup remote probe.
    pub probe_timeout: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

/// Scheduled OS maintenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Whether the daemon runs the steps on a schedule.
    pub enabled: bool,
    /// Hours between scheduled runs.
    pub interval_hours: u64,
    /// Steps, run in order.
    pub steps: Vec<MaintenanceStepConfig>,
}

/// One maintenance command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStepConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// A failing required step aborts the remaining steps.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Seconds before the step is killed; `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_required() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloudmirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudmirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// Well-known user directories mirrored when none are configured.
pub const DEFAULT_DIRECTORIES: &[&str] = &["Documents", "Pictures", "Music", "Videos", "Desktop"];

impl SyncConfig {
    /// Remote name without a trailing `:`.
    pub fn remote_name(&self) -> &str {
        self.remote.trim_end_matches(':')
    }

    /// Turns a configured remote path into a full rclone remote path.
    ///
    /// Paths that already carry a `name:` prefix are returned unchanged.
    pub fn qualify_remote(&self, remote: &str) -> String {
        if remote.contains(':') {
            remote.to_string()
        } else {
            format!("{}:{}", self.remote_name(), remote.trim_start_matches('/'))
        }
    }

    /// Directory pairs to register, with `~` expanded and remotes qualified.
    ///
    /// Falls back to [`DEFAULT_DIRECTORIES`] under the home directory when
    /// no directories are configured. Existence is not checked here.
    pub fn resolved_directories(&self) -> Vec<(PathBuf, String)> {
        if self.directories.is_empty() {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
            return DEFAULT_DIRECTORIES
                .iter()
                .map(|name| (home.join(name), self.qualify_remote(name)))
                .collect();
        }

        self.directories
            .iter()
            .map(|d| (expand_tilde(&d.local), self.qualify_remote(&d.remote)))
            .collect()
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: "gdrive".to_string(),
            poll_interval_secs: 30,
            tick_interval_ms: 1000,
            max_concurrent_syncs: 0,
            directories: Vec::new(),
            excludes: DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            binary: "rclone".to_string(),
            workdir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("~/.cache"))
                .join("rclone")
                .join("bisync"),
            max_transfer: "50G".to_string(),
            transfers: 4,
            checkers: 8,
            mkdir_timeout: 30,
            probe_timeout: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: 24,
            steps: default_maintenance_steps(),
        }
    }
}

fn step(name: &str, program: &str, args: &[&str], required: bool, timeout: u64) -> MaintenanceStepConfig {
    MaintenanceStepConfig {
        name: name.to_string(),
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        required,
        timeout_secs: Some(timeout),
    }
}

/// Package-update sequence used when no steps are configured.
pub fn default_maintenance_steps() -> Vec<MaintenanceStepConfig> {
    vec![
        step("refresh package index", "sudo", &["-n", "apt-get", "update"], true, 600),
        step("upgrade packages", "sudo", &["-n", "apt-get", "-y", "upgrade"], true, 3600),
        step("update flatpaks", "flatpak", &["update", "-y", "--noninteractive"], false, 1800),
        step("remove unused packages", "sudo", &["-n", "apt-get", "-y", "autoremove"], false, 600),
    ]
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Checks rclone size syntax: digits with an optional single unit suffix.
fn is_valid_size(value: &str) -> bool {
    let digits = value.trim_end_matches(|c: char| "BKMGTPbkmgtp".contains(c));
    let suffix_len = value.len() - digits.len();
    !digits.is_empty() && suffix_len <= 1 && digits.chars().all(|c| c.is_ascii_digit())
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- sync ---
        if self.sync.remote_name().trim().is_empty() {
            push("sync.remote", "must not be empty".into());
        } else if self.sync.remote_name().contains(':') {
            push("sync.remote", "must be a bare remote name".into());
        }
        if self.sync.poll_interval_secs == 0 {
            push("sync.poll_interval_secs", "must be greater than 0".into());
        }
        if self.sync.tick_interval_ms == 0 {
            push("sync.tick_interval_ms", "must be greater than 0".into());
        }
        for (i, dir) in self.sync.directories.iter().enumerate() {
            if dir.local.as_os_str().is_empty() {
                push(&format!("sync.directories[{i}].local"), "must not be empty".into());
            }
            if dir.remote.trim().is_empty() {
                push(&format!("sync.directories[{i}].remote"), "must not be empty".into());
            }
        }
        if let Err(e) = ExcludeRules::new(self.sync.excludes.iter().cloned()) {
            push("sync.excludes", e.to_string());
        }

        // --- rclone ---
        if self.rclone.binary.trim().is_empty() {
            push("rclone.binary", "must not be empty".into());
        }
        if !is_valid_size(&self.rclone.max_transfer) {
            push(
                "rclone.max_transfer",
                format!("invalid size '{}'", self.rclone.max_transfer),
            );
        }
        if self.rclone.transfers == 0 {
            push("rclone.transfers", "must be greater than 0".into());
        }
        if self.rclone.checkers == 0 {
            push("rclone.checkers", "must be greater than 0".into());
        }
        if self.rclone.mkdir_timeout == 0 {
            push("rclone.mkdir_timeout", "must be greater than 0".into());
        }
        if self.rclone.probe_timeout == 0 {
            push("rclone.probe_timeout", "must be greater than 0".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        // --- maintenance ---
        if self.maintenance.enabled && self.maintenance.interval_hours == 0 {
            push("maintenance.interval_hours", "must be greater than 0".into());
        }
        for (i, step) in self.maintenance.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                push(&format!("maintenance.steps[{i}].name"), "must not be empty".into());
            }
            if step.program.trim().is_empty() {
                push(&format!("maintenance.steps[{i}].program"), "must not be empty".into());
            }
            if step.timeout_secs == Some(0) {
                push(
                    &format!("maintenance.steps[{i}].timeout_secs"),
                    "must be greater than 0".into(),
                );
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cloudmirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_remote("dropbox")
///     .sync_poll_interval(60)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_remote(mut self, remote: impl Into<String>) -> Self {
        self.config.sync.remote = remote.into();
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval_secs = seconds;
        self
    }

    pub fn sync_tick_interval_ms(mut self, millis: u64) -> Self {
        self.config.sync.tick_interval_ms = millis;
        self
    }

    pub fn sync_max_concurrent(mut self, n: u32) -> Self {
        self.config.sync.max_concurrent_syncs = n;
        self
    }

    pub fn sync_directory(mut self, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        self.config.sync.directories.push(DirectoryConfig {
            local: local.into(),
            remote: remote.into(),
        });
        self
    }

    pub fn sync_excludes(mut self, patterns: Vec<String>) -> Self {
        self.config.sync.excludes = patterns;
        self
    }

    // --- rclone ---

    pub fn rclone_binary(mut self, binary: impl Into<String>) -> Self {
        self.config.rclone.binary = binary.into();
        self
    }

    pub fn rclone_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.config.rclone.workdir = workdir.into();
        self
    }

    pub fn rclone_max_transfer(mut self, size: impl Into<String>) -> Self {
        self.config.rclone.max_transfer = size.into();
        self
    }

    pub fn rclone_transfers(mut self, n: u32) -> Self {
        self.config.rclone.transfers = n;
        self
    }

    pub fn rclone_checkers(mut self, n: u32) -> Self {
        self.config.rclone.checkers = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- maintenance ---

    pub fn maintenance_enabled(mut self, enabled: bool) -> Self {
        self.config.maintenance.enabled = enabled;
        self
    }

    pub fn maintenance_interval_hours(mut self, hours: u64) -> Self {
        self.config.maintenance.interval_hours = hours;
        self
    }

    pub fn maintenance_steps(mut self, steps: Vec<MaintenanceStepConfig>) -> Self {
        self.config.maintenance.steps = steps;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
