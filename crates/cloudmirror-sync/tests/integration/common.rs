//! Shared test helpers for orchestrator integration tests
//!
//! Provides a scripted [`CommandRunner`] standing in for rclone. Each
//! invocation is keyed by its subcommand and first positional argument
//! (`"bisync /tmp/x/Documents"`, `"mkdir gdrive:Documents"`, ...) and
//! answered from a per-key script, falling back to a quick success.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;

use cloudmirror_core::{config::RcloneConfig, domain::ExcludeRules};
use cloudmirror_process::{
    CommandOutput, CommandRunner, CommandSpec, LineSink, OutputLine, ProcessError,
};
use cloudmirror_sync::{
    rclone::RcloneTool, DirectoryRegistry, OrchestratorSettings, SyncExecutor, SyncOrchestrator,
};

// ============================================================================
// Scripted responses
// ============================================================================

/// One scripted answer to an invocation
#[derive(Debug, Clone)]
pub struct Scripted {
    delay: Duration,
    exit_code: i32,
    lines: Vec<String>,
    spawn_error: bool,
    panic: bool,
}

impl Scripted {
    pub fn ok() -> Self {
        Self {
            delay: Duration::ZERO,
            exit_code: 0,
            lines: Vec::new(),
            spawn_error: false,
            panic: false,
        }
    }

    pub fn fail(exit_code: i32, lines: &[&str]) -> Self {
        Self {
            exit_code,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::ok()
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::ok()
        }
    }

    pub fn spawn_error() -> Self {
        Self {
            spawn_error: true,
            ..Self::ok()
        }
    }

    pub fn panic() -> Self {
        Self {
            panic: true,
            ..Self::ok()
        }
    }

    /// Makes the invocation take `delay` of (tokio) time
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A recorded invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Files present in the observed directory when the call started
    pub observed_files: usize,
}

impl Invocation {
    pub fn has(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

#[derive(Default)]
struct State {
    scripts: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<Invocation>,
    active: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

/// Fake rclone answering from per-command scripts
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
    observe: Mutex<Option<PathBuf>>,
}

fn key_of(spec: &CommandSpec) -> String {
    match spec.args.get(1) {
        Some(target) => format!("{} {}", spec.args[0], target),
        None => spec.args.first().cloned().unwrap_or_default(),
    }
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for `"<command> <target>"`
    pub fn script(&self, command: &str, target: impl AsRef<str>, step: Scripted) {
        let key = format!("{} {}", command, target.as_ref()).trim().to_string();
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(key)
            .or_default()
            .push_back(step);
    }

    /// Counts files in `dir` at the start of every invocation
    pub fn observe(&self, dir: &Path) {
        *self.observe.lock().unwrap() = Some(dir.to_path_buf());
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Invocations of `command` whose first argument is `target`
    pub fn calls_for(&self, command: &str, target: impl AsRef<str>) -> Vec<Invocation> {
        let target = target.as_ref();
        self.calls()
            .into_iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(command))
            .filter(|c| c.args.get(1).map(String::as_str) == Some(target))
            .collect()
    }

    /// Highest number of overlapping invocations seen for the key
    pub fn peak(&self, command: &str, target: impl AsRef<str>) -> usize {
        let key = format!("{} {}", command, target.as_ref());
        self.state
            .lock()
            .unwrap()
            .peak
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    fn observed_files(&self) -> usize {
        match self.observe.lock().unwrap().as_ref() {
            Some(dir) => std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0),
            None => 0,
        }
    }

    fn default_for(spec: &CommandSpec) -> Scripted {
        match spec.args.first().map(String::as_str) {
            Some("listremotes") => Scripted::lines(&["gdrive:", "other:"]),
            _ => Scripted::ok(),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        sink: &dyn LineSink,
    ) -> Result<CommandOutput, ProcessError> {
        let key = key_of(spec);
        let observed_files = self.observed_files();

        let step = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Invocation {
                args: spec.args.clone(),
                observed_files,
            });
            let step = state
                .scripts
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Self::default_for(spec));

            let active = state.active.entry(key.clone()).or_default();
            *active += 1;
            let now = *active;
            let peak = state.peak.entry(key.clone()).or_default();
            *peak = (*peak).max(now);
            step
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        if let Some(active) = self.state.lock().unwrap().active.get_mut(&key) {
            *active -= 1;
        }

        if step.panic {
            panic!("scripted panic for {key}");
        }
        if step.spawn_error {
            return Err(ProcessError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            });
        }

        let lines: Vec<OutputLine> = step.lines.iter().map(OutputLine::stderr).collect();
        for line in &lines {
            sink.on_line(line.stream, &line.text);
        }
        Ok(CommandOutput::new(step.exit_code, lines))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const TICK: Duration = Duration::from_secs(1);
pub const POLL: Duration = Duration::from_secs(30);

/// Temporary directories plus a work dir, kept alive for the test
pub struct Fixture {
    pub tmp: TempDir,
    pub work_dir: PathBuf,
}

impl Fixture {
    pub fn new(names: &[&str]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        let work_dir = tmp.path().join("workdir");
        std::fs::create_dir(&work_dir).unwrap();
        Self { tmp, work_dir }
    }

    /// Canonical path of a fixture directory
    pub fn dir(&self, name: &str) -> PathBuf {
        std::fs::canonicalize(self.tmp.path().join(name)).unwrap()
    }

    pub fn dir_str(&self, name: &str) -> String {
        self.dir(name).to_string_lossy().into_owned()
    }

    pub fn remote(name: &str) -> String {
        format!("gdrive:{name}")
    }

    pub fn tool(&self) -> RcloneTool {
        RcloneTool::from_config(&RcloneConfig {
            workdir: self.work_dir.clone(),
            ..RcloneConfig::default()
        })
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            remote_name: "gdrive".to_string(),
            poll_interval: POLL,
            tick_interval: TICK,
            max_concurrent: None,
        }
    }

    /// Orchestrator with every fixture directory registered
    pub fn orchestrator(
        &self,
        runner: Arc<ScriptedRunner>,
        settings: OrchestratorSettings,
        names: &[&str],
    ) -> SyncOrchestrator {
        let orchestrator =
            SyncOrchestrator::new(settings, self.tool(), ExcludeRules::empty(), runner);
        for name in names {
            orchestrator
                .register(&self.dir(name), &Self::remote(name))
                .unwrap();
        }
        orchestrator
    }

    /// Executor over a fresh registry holding the named directories
    pub fn executor(
        &self,
        runner: Arc<ScriptedRunner>,
        names: &[&str],
    ) -> (SyncExecutor, Arc<DirectoryRegistry>) {
        let registry = Arc::new(DirectoryRegistry::new());
        for name in names {
            registry.register(&self.dir(name), &Self::remote(name)).unwrap();
        }
        let executor = SyncExecutor::new(
            runner,
            self.tool(),
            Arc::clone(&registry),
            Arc::new(std::sync::RwLock::new(ExcludeRules::empty())),
        );
        (executor, registry)
    }
}

/// Lets spawned tasks and timers run for `duration` of paused time
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
