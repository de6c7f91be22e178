pub mod doctor;
pub mod engine_args;
pub mod export;
pub mod import;
pub mod show;
pub mod slice;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use slicebridge_core::{CoreError, Slicer};
use slicebridge_profile::{
    coerce_or_default, infer, BedShape, Overrides, ParamTable, PrinterGeometry, Profile,
    ProfileError,
};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;
pub const EXIT_CANCELLED: u8 = 130;

/// A command failure: message for stderr plus the process exit code.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        let code = if e.is_config_error() {
            EXIT_CONFIG_ERROR
        } else if e.is_input_error()
            || matches!(e, CoreError::Profile(ProfileError::AlreadyExists(_)))
        {
            EXIT_INPUT_ERROR
        } else {
            EXIT_FAILURE
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

pub type CommandResult = Result<u8, Failure>;

/// Printer description shared by `slice` and `engine-args`.
#[derive(Debug, Clone, Args)]
pub struct PrinterArgs {
    /// Bed width in mm.
    #[arg(long, default_value_t = 200.0)]
    pub bed_width: f64,
    /// Bed depth in mm.
    #[arg(long, default_value_t = 200.0)]
    pub bed_depth: f64,
    /// The bed is circular; its origin is the center.
    #[arg(long, default_value_t = false)]
    pub circular_bed: bool,
    /// Nozzle diameter in mm, used when the profile does not set one.
    #[arg(long, default_value_t = 0.4)]
    pub nozzle: f64,
    /// Object position on the bed as X,Y (defaults to the bed center).
    #[arg(long, value_parser = parse_position)]
    pub position: Option<(f64, f64)>,
}

impl PrinterArgs {
    pub fn geometry(&self) -> PrinterGeometry {
        PrinterGeometry {
            bed_width: self.bed_width,
            bed_depth: self.bed_depth,
            bed_shape: if self.circular_bed {
                BedShape::Circular
            } else {
                BedShape::Rectangular
            },
            nozzle_diameter: self.nozzle,
        }
    }
}

pub fn parse_position(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x = x
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid X '{x}': {e}"))?;
    let y = y
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid Y '{y}': {e}"))?;
    Ok((x, y))
}

pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.trim().to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Build an override set from `--set KEY=VALUE` pairs, typed through the table.
pub fn overrides_from(table: &ParamTable, pairs: &[(String, String)]) -> Overrides {
    let mut overrides = Overrides::new();
    for (key, raw) in pairs {
        let value = match table.get(key) {
            Some(def) => coerce_or_default(def, raw),
            None => Some(infer(raw)),
        };
        if let Some(value) = value {
            overrides.insert(key.clone(), value);
        }
    }
    overrides
}

/// Load a profile given either a file path or a stored profile name.
/// No argument selects the default profile.
pub fn load_profile(slicer: &Slicer, profile: Option<&str>) -> Result<Profile, CoreError> {
    match profile {
        None => slicer.default_profile(),
        Some(p) if Path::new(p).is_file() => slicer.get_profile(Path::new(p)),
        Some(name) => slicer.library()?.load(slicer.table(), name),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "succeeded" => Style::new().green().apply_to(status).to_string(),
        "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "cancelled" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicebridge_core::SlicerConfig;
    use slicebridge_profile::ParamValue;

    #[test]
    fn position_parses() {
        assert_eq!(parse_position("10,20.5").unwrap(), (10.0, 20.5));
        assert_eq!(parse_position(" 1 , 2 ").unwrap(), (1.0, 2.0));
        assert!(parse_position("10").is_err());
        assert!(parse_position("a,2").is_err());
    }

    #[test]
    fn assignment_parses() {
        assert_eq!(
            parse_assignment("perimeters=5").unwrap(),
            ("perimeters".to_owned(), "5".to_owned())
        );
        assert_eq!(
            parse_assignment("start_gcode=G28 X0").unwrap(),
            ("start_gcode".to_owned(), "G28 X0".to_owned())
        );
        assert!(parse_assignment("=5").is_err());
        assert!(parse_assignment("perimeters").is_err());
    }

    #[test]
    fn overrides_are_typed_by_table() {
        let table = ParamTable::slic3r();
        let pairs = vec![
            ("perimeters".to_owned(), "5".to_owned()),
            ("fill_density".to_owned(), "15%".to_owned()),
            ("my_custom_key".to_owned(), "2.5".to_owned()),
        ];
        let overrides = overrides_from(table, &pairs);
        assert_eq!(overrides["perimeters"], ParamValue::Int(5));
        assert_eq!(overrides["fill_density"], ParamValue::text("15%"));
        assert_eq!(overrides["my_custom_key"], ParamValue::Float(2.5));
    }

    #[test]
    fn failure_codes_follow_error_class() {
        assert_eq!(Failure::from(CoreError::NotConfigured).code, EXIT_CONFIG_ERROR);
        assert_eq!(
            Failure::from(CoreError::InvalidInput("x".to_owned())).code,
            EXIT_INPUT_ERROR
        );
        assert_eq!(
            Failure::from(CoreError::Profile(ProfileError::AlreadyExists("p".to_owned()))).code,
            EXIT_INPUT_ERROR
        );
        assert_eq!(
            Failure::from(CoreError::JobAlreadyRunning("o".to_owned())).code,
            EXIT_FAILURE
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_INPUT_ERROR,
            EXIT_CONFIG_ERROR,
            EXIT_CANCELLED,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn load_profile_without_argument_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let slicer = Slicer::new(SlicerConfig {
            profiles_dir: Some(dir.path().to_path_buf()),
            ..SlicerConfig::default()
        });
        let profile = load_profile(&slicer, None).unwrap();
        assert_eq!(profile.get("perimeters"), Some(&ParamValue::Int(3)));
    }

    #[test]
    fn colorize_status_keeps_text() {
        assert!(colorize_status("succeeded").contains("succeeded"));
        assert_eq!(colorize_status("other"), "other");
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("slicing...");
        spin_ok(&pb, "done");
        let pb = spinner("slicing...");
        spin_fail(&pb, "failed");
    }
}
