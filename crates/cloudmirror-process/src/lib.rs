//! CloudMirror Process - subprocess execution for external tools
//!
//! Every external program the daemon drives (the sync tool, package
//! managers) goes through the [`CommandRunner`] trait. The production
//! implementation, [`TokioCommandRunner`], streams stdout and stderr line by
//! line to a [`LineSink`] while capturing them, enforces an optional
//! timeout, and can be told to kill whatever it is running through a
//! shared cancellation token.
//!
//! Tests substitute their own [`CommandRunner`] to script tool behavior.

pub mod error;
pub mod runner;

pub use error::ProcessError;
pub use runner::{
    CommandOutput, CommandRunner, CommandSpec, LineSink, NullSink, OutputLine, OutputStream,
    TokioCommandRunner, TracingSink,
};
