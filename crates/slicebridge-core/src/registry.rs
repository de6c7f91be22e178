//! Shared table of running jobs, keyed by output path.
//!
//! A job claims its output path before the engine is launched and holds a
//! [`JobGuard`] until teardown. The guard removes the registry entry and any
//! pending cancellation marker in one critical section, so a cancellation
//! can never leak onto a later job reusing the same path.

use crate::controller::ENGINE_TARGET;
use crate::lifecycle::JobState;
use crate::CoreError;
use slicebridge_runtime::EngineHandle;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub(crate) const SEPARATOR: &str = "----------------------------------------";

#[derive(Debug)]
struct JobEntry {
    handle: Option<Arc<EngineHandle>>,
    state: JobState,
}

#[derive(Debug, Default)]
struct Jobs {
    running: HashMap<PathBuf, JobEntry>,
    cancelled: HashSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: Mutex<Jobs>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the maps consistent, so a panic in another
    // holder does not invalidate them.
    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `output` for a new job.
    pub fn claim(&self, output: &Path) -> Result<JobGuard<'_>, CoreError> {
        let mut jobs = self.lock();
        if jobs.running.contains_key(output) {
            return Err(CoreError::JobAlreadyRunning(output.display().to_string()));
        }
        jobs.running.insert(
            output.to_path_buf(),
            JobEntry {
                handle: None,
                state: JobState::Idle,
            },
        );
        debug!("claimed job slot for {}", output.display());
        Ok(JobGuard {
            registry: self,
            output: output.to_path_buf(),
            released: false,
        })
    }

    /// Mark the job for `output` cancelled and ask its engine to stop.
    ///
    /// Returns whether a job was found. Unknown paths are ignored.
    pub fn cancel(&self, output: &Path) -> bool {
        let handle = {
            let mut jobs = self.lock();
            let Some(entry) = jobs.running.get(output) else {
                debug!("no job to cancel for {}", output.display());
                return false;
            };
            let handle = entry.handle.clone();
            jobs.cancelled.insert(output.to_path_buf());
            handle
        };

        info!("cancelled slicing of {}", output.display());
        if let Some(handle) = handle {
            if let Err(e) = handle.terminate() {
                warn!("failed to terminate engine for {}: {e}", output.display());
            }
        }
        true
    }

    pub fn is_registered(&self, output: &Path) -> bool {
        self.lock().running.contains_key(output)
    }

    pub fn is_cancel_pending(&self, output: &Path) -> bool {
        self.lock().cancelled.contains(output)
    }

    pub fn state(&self, output: &Path) -> Option<JobState> {
        self.lock().running.get(output).map(|e| e.state)
    }

    /// Output paths of all registered jobs, sorted.
    pub fn active(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().running.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().running.is_empty()
    }
}

/// Ownership of one registry slot. Dropping it tears the slot down.
#[derive(Debug)]
pub struct JobGuard<'a> {
    registry: &'a JobRegistry,
    output: PathBuf,
    released: bool,
}

impl JobGuard<'_> {
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Attach the launched engine. Returns whether a cancellation arrived
    /// while the job was still launching.
    pub fn attach(&self, handle: Arc<EngineHandle>) -> bool {
        let mut jobs = self.registry.lock();
        let pending = jobs.cancelled.contains(&self.output);
        if let Some(entry) = jobs.running.get_mut(&self.output) {
            entry.handle = Some(handle);
        }
        pending
    }

    pub fn set_state(&self, state: JobState) {
        if let Some(entry) = self.registry.lock().running.get_mut(&self.output) {
            entry.state = state;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancel_pending(&self.output)
    }

    /// Remove the slot and its cancellation marker together.
    /// Returns whether the job had been cancelled.
    pub fn finish(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let mut jobs = self.registry.lock();
        jobs.running.remove(&self.output);
        jobs.cancelled.remove(&self.output)
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!("job for {} torn down without an outcome", self.output.display());
            self.release();
            info!(target: ENGINE_TARGET, "{SEPARATOR}");
        }
    }
}
