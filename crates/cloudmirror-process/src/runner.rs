//! Command runner trait and its tokio implementation
//!
//! ## Flow
//!
//! ```text
//! CommandSpec ──→ CommandRunner::run ──→ child process
//!                        │                 │ stdout / stderr
//!                        │                 ▼
//!                        │           LineSink::on_line (per line)
//!                        ▼
//!                  CommandOutput { exit_code, lines }
//! ```
//!
//! The runner never interprets output. Deciding what a failure means is left
//! to the caller.

use std::{fmt, io, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProcessError;

// ============================================================================
// CommandSpec
// ============================================================================

/// A program invocation: executable, arguments and optional timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the argument list contains `flag`
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ============================================================================
// CommandOutput
// ============================================================================

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured line of output, without its trailing newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// Result of a command that ran to completion
///
/// `exit_code` is `-1` when the process was terminated by a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub lines: Vec<OutputLine>,
}

impl CommandOutput {
    pub fn new(exit_code: i32, lines: Vec<OutputLine>) -> Self {
        Self { exit_code, lines }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// All lines from both streams in arrival order, newline-joined
    pub fn combined(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stderr_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| l.stream == OutputStream::Stderr)
            .map(|l| l.text.as_str())
    }

    /// The last `n` non-blank lines from both streams
    pub fn tail(&self, n: usize) -> Vec<&str> {
        let mut tail: Vec<&str> = self
            .lines
            .iter()
            .rev()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .take(n)
            .collect();
        tail.reverse();
        tail
    }
}

// ============================================================================
// LineSink
// ============================================================================

/// Receives output lines as they are produced
pub trait LineSink: Send + Sync {
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// Discards every line
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LineSink for NullSink {
    fn on_line(&self, _stream: OutputStream, _line: &str) {}
}

/// Logs every line at debug level, tagged with a source label
#[derive(Debug, Clone)]
pub struct TracingSink {
    source: String,
}

impl TracingSink {
    /// `source` is recorded in the `source` field of each event, e.g. the
    /// local directory being synchronized
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl LineSink for TracingSink {
    fn on_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => debug!(source = %self.source, "{}", line),
            OutputStream::Stderr => debug!(source = %self.source, stream = "stderr", "{}", line),
        }
    }
}

// ============================================================================
// CommandRunner
// ============================================================================

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` to completion, feeding each output line to `sink`
    ///
    /// # Errors
    /// Returns [`ProcessError`] when the program cannot be started, exceeds
    /// its timeout, or is killed. A non-zero exit code is reported through
    /// [`CommandOutput::exit_code`], not as an error.
    async fn run(&self, spec: &CommandSpec, sink: &dyn LineSink)
        -> Result<CommandOutput, ProcessError>;
}

/// [`CommandRunner`] backed by `tokio::process`
///
/// Cancelling the kill token terminates the command currently running and
/// every command started afterwards.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    kill: CancellationToken,
}

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose children are killed when `kill` is cancelled
    pub fn with_kill_token(kill: CancellationToken) -> Self {
        Self { kill }
    }

    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }
}

enum Ending {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut(Duration),
    Killed,
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        sink: &dyn LineSink,
    ) -> Result<CommandOutput, ProcessError> {
        if self.kill.is_cancelled() {
            return Err(ProcessError::Killed {
                program: spec.program.clone(),
            });
        }

        debug!(command = %spec, "Spawning command");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr was not captured"))?;

        let mut lines = Vec::new();

        let ending = {
            let collect = async {
                let mut out = BufReader::new(stdout);
                let mut err = BufReader::new(stderr);
                let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
                let (mut out_done, mut err_done) = (false, false);

                while !(out_done && err_done) {
                    let (stream, line) = tokio::select! {
                        line = read_line_lossy(&mut out, &mut out_buf), if !out_done => {
                            (OutputStream::Stdout, line?)
                        }
                        line = read_line_lossy(&mut err, &mut err_buf), if !err_done => {
                            (OutputStream::Stderr, line?)
                        }
                    };
                    match line {
                        Some(text) => {
                            sink.on_line(stream, &text);
                            lines.push(OutputLine { stream, text });
                        }
                        None if stream == OutputStream::Stdout => out_done = true,
                        None => err_done = true,
                    }
                }

                child.wait().await
            };
            tokio::pin!(collect);

            let deadline = async {
                match spec.timeout {
                    Some(timeout) => {
                        tokio::time::sleep(timeout).await;
                        timeout
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                status = &mut collect => Ending::Exited(status),
                timeout = deadline => Ending::TimedOut(timeout),
                _ = self.kill.cancelled() => Ending::Killed,
            }
        };

        match ending {
            Ending::Exited(status) => {
                let status = status?;
                let exit_code = status.code().unwrap_or(-1);
                debug!(program = %spec.program, exit_code, lines = lines.len(), "Command finished");
                Ok(CommandOutput::new(exit_code, lines))
            }
            Ending::TimedOut(timeout) => {
                warn!(command = %spec, timeout_secs = timeout.as_secs(), "Command timed out, killing it");
                terminate(&mut child).await;
                Err(ProcessError::TimedOut {
                    program: spec.program.clone(),
                    timeout,
                })
            }
            Ending::Killed => {
                warn!(command = %spec, "Killing command on forced shutdown");
                terminate(&mut child).await;
                Err(ProcessError::Killed {
                    program: spec.program.clone(),
                })
            }
        }
    }
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Child already exited");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed child");
    }
}

/// Reads one line, replacing invalid UTF-8, with the line ending stripped
///
/// Partial data survives cancellation in `buf`, so the future can be raced
/// in `select!` and recreated.
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    let text = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Ok(Some(text))
}
