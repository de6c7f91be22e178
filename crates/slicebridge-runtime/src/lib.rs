//! Execution layer for external slicing engines.
//!
//! This crate knows how to talk to an engine binary: dialect detection from
//! `--help` output with one `CommandBuilder` per command-line dialect, process
//! spawning with line-oriented output pumping (`OutputPump`), a shareable
//! process handle supporting cooperative termination (`EngineHandle`),
//! extraction of the print summary the engine writes into its G-code, and
//! prerequisite checks for the configured executable.

pub mod dialect;
pub mod metadata;
pub mod prereq;
pub mod process;

pub use dialect::{
    detect_dialect, detect_dialect_within, select_dialect, CommandBuilder, EngineCommand,
    PrusaDialect, Slic3rDialect, SliceInvocation, HELP_TIMEOUT,
};
pub use metadata::{extract_metadata, parse_metadata, FilamentUsage, SliceMetadata};
pub use prereq::{check_engine, format_missing, MissingPrereq};
pub use process::{spawn_engine, EngineHandle, OutputLine, OutputPump, Pumped};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine executable not found: {0}")]
    EngineNotFound(String),
    #[error("unknown engine dialect '{0}'")]
    UnknownDialect(String),
    #[error("failed to start engine: {0}")]
    SpawnFailed(String),
    #[error("engine execution failed: {0}")]
    ExecFailed(String),
}
