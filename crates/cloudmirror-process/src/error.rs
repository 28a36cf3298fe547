//! Subprocess errors

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running an external command
///
/// A command that runs to completion with a non-zero exit code is not an
/// error at this level; callers inspect [`CommandOutput`](crate::CommandOutput).
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exceeded its timeout and was killed
    #[error("'{program}' timed out after {}s", timeout.as_secs_f64())]
    TimedOut { program: String, timeout: Duration },

    /// The command was killed by a forced shutdown
    #[error("'{program}' was killed")]
    Killed { program: String },

    /// Reading output or waiting for the child failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
