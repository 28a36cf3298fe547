//! CLI subcommands

pub mod completions;
pub mod config;
pub mod daemon;
pub mod excludes;
pub mod maintenance;
pub mod orchestrator;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Makes `path` absolute against the current directory
///
/// The daemon resolves paths against its own working directory, so relative
/// paths must be expanded on this side. Symlinks are left for the daemon.
pub(crate) fn absolute_path(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path)
    };
    Ok(normalize(&absolute).display().to_string())
}

/// Drops `.` components and resolves `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
