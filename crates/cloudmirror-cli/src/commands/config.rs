//! Config command - View and check CloudMirror configuration
//!
//! Provides the `cloudmirror config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors
//! 3. Prints the configuration file path
//!
//! These read the file directly; the daemon does not need to be running.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use cloudmirror_core::config::{Config, ValidationError};
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command against `path`, or the default location
    pub async fn execute(&self, format: OutputFormat, path: Option<PathBuf>) -> Result<()> {
        let config_path = path.unwrap_or_else(Config::default_path);
        match self {
            ConfigCommand::Show => execute_show(&config_path, format),
            ConfigCommand::Validate => execute_validate(&config_path, format),
            ConfigCommand::Path => execute_path(&config_path, format),
        }
    }
}

/// Shows the configuration, with defaults filled in
fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format.is_json());
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    if config_path.exists() {
        formatter.success(&format!("Configuration ({})", config_path.display()));
    } else {
        formatter.success(&format!(
            "Default configuration ({} does not exist)",
            config_path.display()
        ));
    }
    formatter.info("");

    let yaml =
        serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }

    Ok(())
}

/// Outcome of checking a configuration file
#[derive(Debug)]
enum Validation {
    Missing,
    Unparseable(String),
    Checked(Vec<ValidationError>),
}

fn validate_file(config_path: &Path) -> Validation {
    if !config_path.exists() {
        return Validation::Missing;
    }
    match Config::load(config_path) {
        Ok(config) => Validation::Checked(config.validate()),
        Err(e) => Validation::Unparseable(format!("{e:#}")),
    }
}

/// Validates the configuration file; fails when it is invalid
fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format.is_json());

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors: Vec<String> = match validate_file(config_path) {
        Validation::Missing => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": config_path.display().to_string(),
                    "exists": false,
                    "errors": [],
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info("The defaults are used and are valid.");
            }
            return Ok(());
        }
        Validation::Unparseable(e) => vec![format!("Failed to parse configuration: {e}")],
        Validation::Checked(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "exists": true,
            "errors": errors,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.info(&format!("File: {}", config_path.display()));
        for error in &errors {
            formatter.info(&format!("  {error}"));
        }
    }

    if !errors.is_empty() {
        bail!(
            "Configuration has {} error{}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

fn execute_path(config_path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        get_formatter(true).print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}
