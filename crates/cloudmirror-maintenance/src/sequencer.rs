//! Maintenance sequencer and its reports

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cloudmirror_core::config::MaintenanceStepConfig;
use cloudmirror_process::{CommandRunner, CommandSpec, TracingSink};

/// Errors that prevent a maintenance run from starting
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaintenanceError {
    #[error("A maintenance run is already in progress")]
    AlreadyRunning,

    #[error("No maintenance steps are configured")]
    NoSteps,
}

// ============================================================================
// Steps and reports
// ============================================================================

/// One command in the maintenance sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceStep {
    pub name: String,
    pub command: CommandSpec,
    /// A failing required step aborts the rest of the sequence
    pub required: bool,
}

impl From<&MaintenanceStepConfig> for MaintenanceStep {
    fn from(config: &MaintenanceStepConfig) -> Self {
        let mut command = CommandSpec::new(&config.program).args(config.args.iter().cloned());
        if let Some(secs) = config.timeout_secs {
            command = command.timeout(Duration::from_secs(secs));
        }
        Self {
            name: config.name.clone(),
            command,
            required: config.required,
        }
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub name: String,
    pub required: bool,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Outcome of one pass through the sequence
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<StepResult>,
    /// A required step failed and the remaining steps were skipped
    pub aborted: bool,
}

impl MaintenanceReport {
    /// Whether every step succeeded
    pub fn all_succeeded(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status == StepStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Failed { .. }))
    }
}

// ============================================================================
// MaintenanceSequencer
// ============================================================================

/// Runs maintenance steps in order
pub struct MaintenanceSequencer {
    runner: Arc<dyn CommandRunner>,
    steps: Vec<MaintenanceStep>,
    running: AtomicBool,
    last_report: Mutex<Option<MaintenanceReport>>,
}

/// Clears the in-progress flag when a run ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MaintenanceSequencer {
    pub fn new(runner: Arc<dyn CommandRunner>, steps: Vec<MaintenanceStep>) -> Self {
        Self {
            runner,
            steps,
            running: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, steps: &[MaintenanceStepConfig]) -> Self {
        Self::new(runner, steps.iter().map(MaintenanceStep::from).collect())
    }

    pub fn steps(&self) -> &[MaintenanceStep] {
        &self.steps
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Report of the most recent finished run, scheduled or on demand
    pub fn last_report(&self) -> Option<MaintenanceReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs every step once
    ///
    /// # Errors
    /// [`MaintenanceError::AlreadyRunning`] if another run is in progress,
    /// [`MaintenanceError::NoSteps`] if the sequence is empty. Step failures
    /// are reported in the [`MaintenanceReport`], not as errors.
    pub async fn run(&self) -> Result<MaintenanceReport, MaintenanceError> {
        if self.steps.is_empty() {
            return Err(MaintenanceError::NoSteps);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MaintenanceError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let started_at = Utc::now();
        let mut results = Vec::with_capacity(self.steps.len());
        let mut aborted = false;

        info!(steps = self.steps.len(), "Starting maintenance run");

        for step in &self.steps {
            if aborted {
                results.push(StepResult {
                    name: step.name.clone(),
                    required: step.required,
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                });
                continue;
            }

            let (status, duration_ms) = self.run_step(step).await;

            if let StepStatus::Failed { error } = &status {
                if step.required {
                    error!(step = %step.name, error = %error, "Required maintenance step failed, aborting");
                    aborted = true;
                } else {
                    warn!(step = %step.name, error = %error, "Optional maintenance step failed");
                }
            }

            results.push(StepResult {
                name: step.name.clone(),
                required: step.required,
                status,
                duration_ms,
            });
        }

        let report = MaintenanceReport {
            started_at,
            results,
            aborted,
        };
        info!(
            aborted,
            failed = report.failed().count(),
            "Maintenance run finished"
        );
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        Ok(report)
    }

    async fn run_step(&self, step: &MaintenanceStep) -> (StepStatus, u64) {
        let started = Instant::now();
        info!(step = %step.name, command = %step.command, "Running maintenance step");

        let sink = TracingSink::new(step.name.clone());
        let status = match self.runner.run(&step.command, &sink).await {
            Ok(output) if output.success() => StepStatus::Succeeded,
            Ok(output) => {
                let tail = output.tail(3).join("\n");
                let error = if tail.is_empty() {
                    format!("exited with code {}", output.exit_code)
                } else {
                    format!("exited with code {}: {}", output.exit_code, tail)
                };
                StepStatus::Failed { error }
            }
            Err(e) => StepStatus::Failed {
                error: e.to_string(),
            },
        };

        (status, started.elapsed().as_millis() as u64)
    }

    /// Runs the sequence every `interval` until `cancel` fires
    ///
    /// The first run happens one full interval after the call.
    pub async fn run_periodically(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = interval.as_secs(), "Maintenance schedule started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run().await {
                        warn!(error = %e, "Scheduled maintenance did not run");
                    }
                }
            }
        }

        info!("Maintenance schedule stopped");
    }
}
