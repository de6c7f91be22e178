//! The host-facing slicing API.

use crate::config::SlicerConfig;
use crate::controller::{JobController, JobOutcome};
use crate::library::ProfileLibrary;
use crate::CoreError;
use serde::Serialize;
use slicebridge_profile::settings::NOZZLE_DIAMETER;
use slicebridge_profile::{
    to_engine_args, Overrides, ParamTable, PrinterGeometry, Profile, SliceSettings,
};
use slicebridge_runtime::{
    detect_dialect_within, select_dialect, CommandBuilder, RuntimeError, SliceInvocation,
    HELP_TIMEOUT,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROFILE_FILE: &str = "default.profile.ini";
const OUTPUT_EXTENSION: &str = "gco";

/// Static description of this slicer for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlicerProperties {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub same_device: bool,
    pub progress_report: bool,
}

#[derive(Debug, Clone)]
pub struct SliceRequest {
    pub model: PathBuf,
    pub geometry: PrinterGeometry,
    /// Defaults to the model path with a `.gco` extension.
    pub output: Option<PathBuf>,
    /// Defaults to the configured default profile.
    pub profile: Option<PathBuf>,
    pub position: Option<(f64, f64)>,
    pub overrides: Overrides,
}

impl SliceRequest {
    pub fn new(model: impl Into<PathBuf>, geometry: PrinterGeometry) -> Self {
        Self {
            model: model.into(),
            geometry,
            output: None,
            profile: None,
            position: None,
            overrides: Overrides::new(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.model.with_extension(OUTPUT_EXTENSION))
    }
}

pub struct Slicer {
    config: SlicerConfig,
    table: &'static ParamTable,
    controller: JobController,
    help_timeout: Duration,
    /// Dialect detected from the engine's `--help`, once per slicer.
    detected: OnceLock<String>,
}

impl Slicer {
    pub fn new(config: SlicerConfig) -> Self {
        Self::with_controller(config, JobController::new())
    }

    pub fn with_controller(config: SlicerConfig, controller: JobController) -> Self {
        Self {
            config,
            table: ParamTable::slic3r(),
            controller,
            help_timeout: HELP_TIMEOUT,
            detected: OnceLock::new(),
        }
    }

    /// How long dialect detection waits for `--help`.
    #[must_use]
    pub fn with_help_timeout(mut self, timeout: Duration) -> Self {
        self.help_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    pub fn table(&self) -> &'static ParamTable {
        self.table
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    pub fn library(&self) -> Result<ProfileLibrary, CoreError> {
        Ok(ProfileLibrary::new(self.config.profiles_dir()?))
    }

    pub fn properties() -> SlicerProperties {
        SlicerProperties {
            kind: "slic3r",
            name: "Slic3r",
            same_device: true,
            progress_report: false,
        }
    }

    /// Whether a configured engine executable exists.
    pub fn is_engine_configured(&self) -> bool {
        self.config.engine.as_deref().is_some_and(Path::is_file)
    }

    fn engine(&self) -> Result<&Path, CoreError> {
        let engine = self.config.engine.as_deref().ok_or(CoreError::NotConfigured)?;
        if !engine.is_file() {
            return Err(RuntimeError::EngineNotFound(engine.display().to_string()).into());
        }
        Ok(engine)
    }

    /// Configured dialect, else the one the engine's `--help` reveals.
    ///
    /// Detection runs once; later calls reuse its answer.
    pub fn dialect(&self) -> Result<Box<dyn CommandBuilder>, CoreError> {
        if let Some(name) = &self.config.dialect {
            return Ok(select_dialect(name)?);
        }
        if let Some(name) = self.detected.get() {
            return Ok(select_dialect(name)?);
        }
        let dialect = detect_dialect_within(self.engine()?, self.help_timeout)?;
        let _ = self.detected.set(dialect.name().to_owned());
        Ok(dialect)
    }

    /// Configured default profile, else `<profiles_dir>/default.profile.ini`.
    pub fn default_profile_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.default_profile {
            return Some(path.clone());
        }
        let candidate = self.config.profiles_dir().ok()?.join(DEFAULT_PROFILE_FILE);
        candidate.is_file().then_some(candidate)
    }

    /// The default profile; the built-in table when no file is available.
    pub fn default_profile(&self) -> Result<Profile, CoreError> {
        match self.default_profile_path() {
            Some(path) => self.get_profile(&path),
            None => Ok(Profile::defaults(self.table)),
        }
    }

    pub fn get_profile(&self, path: &Path) -> Result<Profile, CoreError> {
        Ok(Profile::load(self.table, path)?)
    }

    /// Write `profile` to `path`, merging `overrides` over it first.
    pub fn save_profile(
        &self,
        path: &Path,
        profile: &Profile,
        allow_overwrite: bool,
        overrides: Option<&Overrides>,
    ) -> Result<(), CoreError> {
        let merged = match overrides {
            Some(overrides) => profile.clone().with_overrides(overrides),
            None => profile.clone(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        merged.save(path, allow_overwrite)?;
        Ok(())
    }

    /// Engine arguments a profile resolves to on the given printer.
    pub fn engine_args(
        &self,
        profile: &Profile,
        geometry: PrinterGeometry,
        position: Option<(f64, f64)>,
    ) -> BTreeMap<String, Option<String>> {
        let settings = SliceSettings::new(profile, self.table, geometry).with_position(position);
        to_engine_args(&settings)
    }

    fn load_for_slicing(&self, request: &SliceRequest) -> Result<Profile, CoreError> {
        let profile = match &request.profile {
            Some(path) => self.get_profile(path)?,
            None => self.default_profile()?,
        };
        Ok(profile.with_overrides(&request.overrides))
    }

    /// Slice `request.model`, blocking until the engine finishes.
    ///
    /// Configuration and input problems are errors and nothing is launched.
    /// Once the engine runs, every result is a `JobOutcome`.
    pub fn slice(&self, request: &SliceRequest) -> Result<JobOutcome, CoreError> {
        let executable = self.engine()?;
        if !request.model.is_file() {
            return Err(CoreError::InvalidInput(format!(
                "model not found: {}",
                request.model.display()
            )));
        }
        let output = request.output_path();
        let profile = self.load_for_slicing(request)?;

        let settings = SliceSettings::new(&profile, self.table, request.geometry)
            .with_position(request.position);
        let center = settings.print_center();
        let mut resolved = profile.clone();
        if let Some(nozzle) = settings.get(NOZZLE_DIAMETER) {
            resolved.set(NOZZLE_DIAMETER, nozzle);
        }

        // Lives until the job is torn down.
        let mut profile_file = tempfile::Builder::new()
            .prefix("slicebridge-")
            .suffix(".ini")
            .tempfile()?;
        profile_file.write_all(resolved.to_ini_string().as_bytes())?;
        profile_file.as_file().sync_all()?;
        debug!(
            "resolved profile for {} written to {}",
            output.display(),
            profile_file.path().display()
        );

        let dialect = self.dialect()?;
        let invocation = SliceInvocation {
            executable: executable.to_path_buf(),
            profile_path: profile_file.path().to_path_buf(),
            model_path: request.model.clone(),
            output_path: output,
            center,
        };
        self.controller.run(dialect.as_ref(), &invocation)
    }

    pub fn cancel(&self, output: &Path) {
        self.controller.cancel(output);
    }
}
