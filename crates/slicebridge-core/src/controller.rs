//! Supervision of one engine run per output path.

use crate::lifecycle::{validate_transition, JobState};
use crate::registry::{JobGuard, JobRegistry, SEPARATOR};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use slicebridge_runtime::{
    extract_metadata, spawn_engine, CommandBuilder, EngineHandle, OutputLine, OutputPump, Pumped,
    SliceInvocation, SliceMetadata,
};
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tracing target for the engine's own output and job boundaries.
pub const ENGINE_TARGET: &str = "slicebridge::engine";

pub const UNKNOWN_ERROR: &str = "Unknown error, please consult the log file";

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded {
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<SliceMetadata>,
    },
    Failed {
        exit_code: Option<i32>,
        diagnostic: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded { .. } => JobState::Succeeded,
            Self::Failed { .. } => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    fn unknown() -> Self {
        Self::Failed {
            exit_code: None,
            diagnostic: UNKNOWN_ERROR.to_owned(),
        }
    }
}

/// Launches engine processes, pumps their output, and honours cancellation.
#[derive(Debug)]
pub struct JobController {
    registry: JobRegistry,
    read_timeout: Duration,
    kill_grace: Duration,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController {
    pub fn new() -> Self {
        Self {
            registry: JobRegistry::new(),
            read_timeout: READ_TIMEOUT,
            kill_grace: KILL_GRACE,
        }
    }

    /// How long a terminated engine may linger before it is killed.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Cancel the job writing to `output`, if any.
    pub fn cancel(&self, output: &Path) {
        self.registry.cancel(output);
    }

    /// Run one job to completion on the calling thread.
    ///
    /// Only a duplicate job for the same output is an error; everything that
    /// happens after the slot is claimed ends in a `JobOutcome`.
    pub fn run(
        &self,
        builder: &dyn CommandBuilder,
        invocation: &SliceInvocation,
    ) -> Result<JobOutcome, CoreError> {
        let output = invocation.output_path.as_path();
        let guard = self.registry.claim(output)?;
        let mut state = JobState::Idle;
        advance(&guard, &mut state, JobState::Launching);

        info!(
            target: ENGINE_TARGET,
            "### Slicing {} to {} using profile {}",
            invocation.model_path.display(),
            output.display(),
            invocation.profile_path.display()
        );
        let command = builder.build(invocation);
        info!(
            "running {} ({} dialect)",
            command.display(),
            builder.name()
        );

        let (handle, pump) = match spawn_engine(&command) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("could not slice {}: {e}", output.display());
                advance(&guard, &mut state, JobState::Failed);
                guard.finish();
                info!(target: ENGINE_TARGET, "{SEPARATOR}");
                return Ok(JobOutcome::unknown());
            }
        };
        let handle = Arc::new(handle);
        if guard.attach(Arc::clone(&handle)) {
            debug!("cancellation arrived during launch of {}", output.display());
            if let Err(e) = handle.terminate() {
                warn!("failed to terminate engine for {}: {e}", output.display());
            }
        }
        advance(&guard, &mut state, JobState::Running);

        let supervised = self.supervise(&handle, &pump);
        if let Err(e) = &supervised {
            error!("could not slice {}, unexpected error: {e}", output.display());
            if let Err(e) = handle.kill_and_wait() {
                warn!("failed to kill engine for {}: {e}", output.display());
            }
        }
        let cancelled = guard.finish();
        drop(pump);

        let outcome = match supervised {
            _ if cancelled => {
                info!(target: ENGINE_TARGET, "### Cancelled");
                JobOutcome::Cancelled
            }
            Ok((status, last_error)) => {
                let code = status.code();
                match code {
                    Some(c) => info!(target: ENGINE_TARGET, "### Finished, returncode {c}"),
                    None => info!(target: ENGINE_TARGET, "### Finished, terminated by signal"),
                }
                if status.success() {
                    JobOutcome::Succeeded {
                        metadata: extract_metadata(output),
                    }
                } else {
                    warn!(
                        "could not slice {}, engine returned {code:?}",
                        output.display()
                    );
                    let diagnostic = last_error.unwrap_or_else(|| match code {
                        Some(c) => format!("Got returncode {c}"),
                        None => "Engine was terminated by a signal".to_owned(),
                    });
                    JobOutcome::Failed {
                        exit_code: code,
                        diagnostic,
                    }
                }
            }
            Err(_) => JobOutcome::unknown(),
        };

        if let Err(e) = validate_transition(state, outcome.state()) {
            warn!("job for {}: {e}", output.display());
        }
        info!(target: ENGINE_TARGET, "{SEPARATOR}");
        Ok(outcome)
    }

    /// Pump output until the engine has exited and a final drain finds
    /// nothing more. Returns the exit status and the last non-empty stderr
    /// line.
    fn supervise(
        &self,
        handle: &EngineHandle,
        pump: &OutputPump,
    ) -> Result<(ExitStatus, Option<String>), CoreError> {
        let mut last_error = None;
        let mut closed = false;

        loop {
            if closed {
                thread::sleep(self.read_timeout);
            } else {
                match pump.next(self.read_timeout) {
                    Pumped::Line(line) => record_line(&line, &mut last_error),
                    Pumped::Idle => {}
                    Pumped::Closed => closed = true,
                }
            }

            if let Some(status) = handle.try_wait()? {
                if !closed {
                    self.drain(pump, &mut last_error);
                }
                return Ok((status, last_error));
            }

            if let Some(requested) = handle.terminate_requested_at() {
                if requested.elapsed() >= self.kill_grace {
                    handle.kill()?;
                }
            }
        }
    }

    fn drain(&self, pump: &OutputPump, last_error: &mut Option<String>) {
        while let Pumped::Line(line) = pump.next(self.read_timeout) {
            record_line(&line, last_error);
        }
    }
}

fn advance(guard: &JobGuard<'_>, state: &mut JobState, to: JobState) {
    match validate_transition(*state, to) {
        Ok(()) => {
            debug!("job {}: {} -> {to}", guard.output().display(), state);
            *state = to;
            guard.set_state(to);
        }
        Err(e) => warn!("job {}: {e}", guard.output().display()),
    }
}

fn record_line(line: &OutputLine, last_error: &mut Option<String>) {
    let text = line.text().trim();
    if text.is_empty() {
        return;
    }
    match line {
        OutputLine::Stdout(_) => debug!(target: ENGINE_TARGET, "stdout: {text}"),
        OutputLine::Stderr(_) => {
            debug!(target: ENGINE_TARGET, "stderr: {text}");
            *last_error = Some(text.to_owned());
        }
    }
}
