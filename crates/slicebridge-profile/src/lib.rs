//! Slic3r profile translation.
//!
//! This crate turns the engine's loosely typed `key = value` profile files into
//! typed parameter sets and back: the parameter default table (`ParamTable`),
//! per-shape value coercion, the INI codec, profile assembly with
//! `default < profile < override` precedence (`Profile`), the geometry-aware
//! read view (`SliceSettings`), and the engine argument mapper.

pub mod coerce;
pub mod defaults;
pub mod engine_args;
pub mod ini;
pub mod name;
pub mod profile;
pub mod settings;
pub mod value;

pub use coerce::{coerce, coerce_or_default, infer, parse_flag, CoerceError};
pub use defaults::{ParamDef, ParamTable};
pub use engine_args::{engine_flag_name, to_command_words, to_engine_args};
pub use ini::{parse_profile_file, parse_profile_str, render_profile, write_profile_file, RawProfile};
pub use name::sanitize_profile_name;
pub use profile::{Overrides, Profile};
pub use settings::{BedShape, PrinterGeometry, SliceSettings};
pub use value::{ParamShape, ParamValue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("cannot overwrite {0}")]
    AlreadyExists(String),
    #[error("invalid profile name: {0}")]
    InvalidName(String),
}
