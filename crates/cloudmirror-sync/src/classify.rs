//! Outcome classification for `rclone bisync` runs
//!
//! The tool reports recoverable conditions only through its log text, so
//! every text pattern the orchestrator depends on lives in this module.
//! Matching is case-insensitive over stdout and stderr combined.

use cloudmirror_process::CommandOutput;

/// How a bisync run ended, in recovery priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BisyncOutcome {
    /// Exit code 0
    Success,
    /// A lock file from an earlier run blocks this one
    StaleLock,
    /// The remote directory does not exist
    RemoteMissing,
    /// Listing files are missing or unusable; a resync is required
    StateMissing,
    /// Anything else
    Failed,
}

const LOCK_PATTERNS: &[&str] = &["prior lock file found"];

const REMOTE_MISSING_PATTERNS: &[&str] = &["error reading destination root directory"];

/// A bare "directory not found" only counts when the line names the remote side
const NOT_FOUND: &str = "directory not found";
const REMOTE_SIDE_MARKERS: &[&str] = &["destination", "path2"];

const STATE_MISSING_PATTERNS: &[&str] = &[
    "cannot find prior path1 or path2 listings",
    "must run --resync",
];

/// Error lines kept in a failure summary
pub const ERROR_TAIL_LINES: usize = 5;

/// Classifies a completed bisync run
///
/// A lock conflict wins over everything else because clearing it is the
/// cheapest recovery and the other symptoms are often side effects of it.
pub fn classify(output: &CommandOutput) -> BisyncOutcome {
    if output.success() {
        return BisyncOutcome::Success;
    }

    let text = output.combined().to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));

    let remote_not_found = || {
        text.lines().any(|line| {
            line.contains(NOT_FOUND) && REMOTE_SIDE_MARKERS.iter().any(|m| line.contains(m))
        })
    };

    if matches(LOCK_PATTERNS) {
        BisyncOutcome::StaleLock
    } else if matches(REMOTE_MISSING_PATTERNS) || remote_not_found() {
        BisyncOutcome::RemoteMissing
    } else if matches(STATE_MISSING_PATTERNS) {
        BisyncOutcome::StateMissing
    } else {
        BisyncOutcome::Failed
    }
}

/// Short failure summary: the last error-level lines of `output`
///
/// Falls back to the last lines of output when nothing is tagged `ERROR`,
/// and to the exit code when there was no output at all.
pub fn error_summary(output: &CommandOutput) -> String {
    let mut errors: Vec<&str> = output
        .lines
        .iter()
        .rev()
        .map(|l| l.text.trim())
        .filter(|t| t.contains("ERROR") || t.contains("Failed to bisync"))
        .take(ERROR_TAIL_LINES)
        .collect();
    errors.reverse();

    if errors.is_empty() {
        errors = output.tail(ERROR_TAIL_LINES);
    }
    if errors.is_empty() {
        return format!("exited with code {}", output.exit_code);
    }
    errors.join("\n")
}
