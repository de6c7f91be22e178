//! Job supervision and the host-facing slicing API.
//!
//! This crate ties profile translation and the engine runtime together into
//! the `Slicer` facade: configuration loading (`SlicerConfig`), the shared job
//! registry keyed by output path, the job controller that launches, pumps,
//! cancels and tears down engine processes, the on-disk profile library, and
//! profile import with name sanitisation.

pub mod config;
pub mod controller;
pub mod import;
pub mod library;
pub mod lifecycle;
pub mod registry;
pub mod slicer;

pub use config::{default_config_path, SlicerConfig, ENGINE_ENV, LOG_ENV};
pub use controller::{JobController, JobOutcome, ENGINE_TARGET, UNKNOWN_ERROR};
pub use import::{import_profile, ImportRequest, ImportSource, ImportedProfile};
pub use library::ProfileLibrary;
pub use lifecycle::{validate_transition, JobState};
pub use registry::{JobGuard, JobRegistry};
pub use slicer::{SliceRequest, Slicer, SlicerProperties};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("profile error: {0}")]
    Profile(#[from] slicebridge_profile::ProfileError),
    #[error("runtime error: {0}")]
    Runtime(#[from] slicebridge_runtime::RuntimeError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("slicing engine is not configured")]
    NotConfigured,
    #[error("a slicing job is already running for {0}")]
    JobAlreadyRunning(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Errors caused by what the caller sent rather than by this system.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::Profile(
                    slicebridge_profile::ProfileError::InvalidName(_)
                        | slicebridge_profile::ProfileError::NotFound(_)
                )
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::NotConfigured
                | Self::Runtime(
                    slicebridge_runtime::RuntimeError::EngineNotFound(_)
                        | slicebridge_runtime::RuntimeError::UnknownDialect(_)
                )
        )
    }
}
