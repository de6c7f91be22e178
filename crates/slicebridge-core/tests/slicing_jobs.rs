#![cfg(unix)]

use slicebridge_core::{
    CoreError, JobController, JobOutcome, JobState, SliceRequest, Slicer, SlicerConfig,
    UNKNOWN_ERROR,
};
use slicebridge_profile::{BedShape, ParamValue, PrinterGeometry};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Fake Slic3r: answers `--help`, parses the slicing arguments, then runs
/// `body`.
fn fake_engine(dir: &Path, help: &str, body: &str) -> PathBuf {
    fake_engine_with_help(dir, &format!("echo \"{help}\"\n  exit 0"), body)
}

/// Fake engine whose `--help` branch runs `on_help`.
fn fake_engine_with_help(dir: &Path, on_help: &str, body: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--help" ]; then
  {on_help}
fi
out=""
profile=""
center=""
model=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o|--output) out="$2"; shift 2 ;;
    --load) profile="$2"; shift 2 ;;
    --print-center|--center) center="$2"; shift 2 ;;
    --export-gcode) shift ;;
    *) model="$1"; shift ;;
  esac
done
{body}
"#
    );
    let path = dir.join("slic3r");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const WRITES_GCODE: &str = r#"
cp "$profile" "$out.profile"
echo "Processing $model"
echo "slicing layers" >&2
{
  echo "G28"
  echo "; center = $center"
  echo "; loglevel = $SLIC3R_LOGLEVEL"
  echo "; filament used = 1523.4mm (3.7cm3)"
  echo "; estimated printing time = 1h 4m 12s"
} > "$out"
echo "Done"
"#;

struct Workspace {
    dir: tempfile::TempDir,
    model: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("cube.stl");
        std::fs::write(&model, "solid cube\nendsolid cube\n").unwrap();
        Self { dir, model }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn slicer(&self, engine: PathBuf, dialect: Option<&str>) -> Slicer {
        self.slicer_with(engine, dialect, JobController::new())
    }

    fn slicer_with(
        &self,
        engine: PathBuf,
        dialect: Option<&str>,
        controller: JobController,
    ) -> Slicer {
        let config = SlicerConfig {
            engine: Some(engine),
            dialect: dialect.map(str::to_owned),
            profiles_dir: Some(self.path().join("profiles")),
            ..SlicerConfig::default()
        };
        Slicer::with_controller(config, controller)
    }

    fn request(&self) -> SliceRequest {
        SliceRequest::new(&self.model, geometry())
    }
}

fn geometry() -> PrinterGeometry {
    PrinterGeometry {
        bed_width: 220.0,
        bed_depth: 180.0,
        bed_shape: BedShape::Rectangular,
        nozzle_diameter: 0.6,
    }
}

fn wait_for_state(slicer: &Slicer, output: &Path, state: JobState) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while slicer.controller().registry().state(output) != Some(state) {
        assert!(Instant::now() < deadline, "job never reached {state}");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn successful_job_reports_metadata_and_cleans_up() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", WRITES_GCODE);
    let slicer = ws.slicer(engine, None);
    assert!(slicer.is_engine_configured());

    let outcome = slicer.slice(&ws.request()).unwrap();
    let JobOutcome::Succeeded { metadata } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    let metadata = metadata.unwrap();
    assert_eq!(metadata.estimated_print_time.as_deref(), Some("1h 4m 12s"));
    assert_eq!(metadata.filament["tool0"].length, 1523.4);
    assert_eq!(metadata.filament["tool0"].volume, Some(3.7));

    let output = ws.path().join("cube.gco");
    let gcode = std::fs::read_to_string(&output).unwrap();
    assert!(gcode.contains("; center = 110,90"));
    assert!(!gcode.contains("; loglevel = 3"));

    let profile = std::fs::read_to_string(ws.path().join("cube.gco.profile")).unwrap();
    assert!(profile.contains("nozzle_diameter = 0.6"));

    assert!(slicer.controller().registry().is_empty());
    assert!(!slicer.controller().registry().is_cancel_pending(&output));
}

#[test]
fn prusa_dialect_is_detected_from_help() {
    let ws = Workspace::new();
    let engine = fake_engine(
        ws.path(),
        "PrusaSlicer-2.6.0 usage: --export-gcode",
        WRITES_GCODE,
    );
    let slicer = ws.slicer(engine, None);
    assert_eq!(slicer.dialect().ok().map(|d| d.name().to_owned()), Some("prusa".to_owned()));

    let mut request = ws.request();
    request.position = Some((40.0, 55.5));
    let outcome = slicer.slice(&request).unwrap();
    assert!(outcome.is_success());

    let gcode = std::fs::read_to_string(ws.path().join("cube.gco")).unwrap();
    assert!(gcode.contains("; center = 40,55.5"));
    assert!(gcode.contains("; loglevel = 3"));
}

#[test]
fn explicit_output_profile_and_overrides() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", WRITES_GCODE);
    let slicer = ws.slicer(engine, Some("slic3r"));

    let stored = ws.path().join("fine.ini");
    std::fs::write(&stored, "# Name: Fine\nlayer_height = 0.1\nperimeters = 4\n").unwrap();
    let mut request = ws.request();
    request.output = Some(ws.path().join("out").join("fine.gcode"));
    request.profile = Some(stored);
    request
        .overrides
        .insert("perimeters".to_owned(), ParamValue::Int(6));
    std::fs::create_dir_all(ws.path().join("out")).unwrap();

    let outcome = slicer.slice(&request).unwrap();
    assert!(outcome.is_success());

    let profile = std::fs::read_to_string(ws.path().join("out").join("fine.gcode.profile")).unwrap();
    assert!(profile.contains("layer_height = 0.1"));
    assert!(profile.contains("perimeters = 6"));
    assert!(profile.starts_with("# Name: Fine\n"));
}

#[test]
fn failure_carries_exit_code_and_last_stderr_line() {
    let ws = Workspace::new();
    let engine = fake_engine(
        ws.path(),
        "Slic3r 1.3.0",
        "echo 'loading model'\necho 'Warning: thin walls' >&2\necho 'Error: mesh is not manifold' >&2\nexit 2",
    );
    let slicer = ws.slicer(engine, Some("slic3r"));

    let outcome = slicer.slice(&ws.request()).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            exit_code: Some(2),
            diagnostic: "Error: mesh is not manifold".to_owned(),
        }
    );
    assert!(slicer.controller().registry().is_empty());
}

#[test]
fn silent_failure_reports_return_code() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", "exit 5");
    let slicer = ws.slicer(engine, Some("slic3r"));

    let outcome = slicer.slice(&ws.request()).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            exit_code: Some(5),
            diagnostic: "Got returncode 5".to_owned(),
        }
    );
}

#[test]
fn success_without_summary_has_no_metadata() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", "echo G28 > \"$out\"");
    let slicer = ws.slicer(engine, Some("slic3r"));
    let outcome = slicer.slice(&ws.request()).unwrap();
    assert_eq!(outcome, JobOutcome::Succeeded { metadata: None });
}

#[test]
fn cancellation_wins_over_clean_exit() {
    let ws = Workspace::new();
    // Exits 0 when asked to stop.
    let engine = fake_engine(
        ws.path(),
        "Slic3r 1.3.0",
        "trap 'exit 0' TERM\necho started\nsleep 30 >/dev/null 2>&1 &\nwait $!",
    );
    let slicer = Arc::new(ws.slicer(engine, Some("slic3r")));
    let output = ws.path().join("cube.gco");

    let worker = {
        let slicer = Arc::clone(&slicer);
        let request = ws.request();
        thread::spawn(move || slicer.slice(&request))
    };
    wait_for_state(&slicer, &output, JobState::Running);
    slicer.cancel(&output);

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert!(!slicer.controller().registry().is_registered(&output));
    assert!(!slicer.controller().registry().is_cancel_pending(&output));
}

#[test]
fn stubborn_engine_is_killed_after_grace() {
    let ws = Workspace::new();
    let engine = fake_engine(
        ws.path(),
        "Slic3r 1.3.0",
        "trap '' TERM\nwhile true; do sleep 0.1; done",
    );
    let controller = JobController::new().with_kill_grace(Duration::from_millis(300));
    let slicer = Arc::new(ws.slicer_with(engine, Some("slic3r"), controller));
    let output = ws.path().join("cube.gco");

    let worker = {
        let slicer = Arc::clone(&slicer);
        let request = ws.request();
        thread::spawn(move || slicer.slice(&request))
    };
    wait_for_state(&slicer, &output, JobState::Running);
    let started = Instant::now();
    slicer.cancel(&output);

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(slicer.controller().registry().is_empty());
}

#[test]
fn one_job_per_output_path() {
    let ws = Workspace::new();
    let engine = fake_engine(
        ws.path(),
        "Slic3r 1.3.0",
        "trap 'exit 1' TERM\nsleep 30 >/dev/null 2>&1 &\nwait $!",
    );
    let slicer = Arc::new(ws.slicer(engine, Some("slic3r")));
    let output = ws.path().join("cube.gco");

    let worker = {
        let slicer = Arc::clone(&slicer);
        let request = ws.request();
        thread::spawn(move || slicer.slice(&request))
    };
    wait_for_state(&slicer, &output, JobState::Running);

    let err = slicer.slice(&ws.request()).unwrap_err();
    assert!(matches!(err, CoreError::JobAlreadyRunning(_)));

    slicer.cancel(&output);
    assert_eq!(worker.join().unwrap().unwrap(), JobOutcome::Cancelled);

    // The slot and its cancellation marker are gone; the next job is unaffected.
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", "exit 0");
    let next = ws.slicer(engine, Some("slic3r"));
    assert!(next.slice(&ws.request()).unwrap().is_success());
}

#[test]
fn cancelling_an_unknown_job_is_harmless() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", "exit 0");
    let slicer = ws.slicer(engine, Some("slic3r"));
    slicer.cancel(&ws.path().join("never-started.gco"));
    assert!(slicer.slice(&ws.request()).unwrap().is_success());
}

#[test]
fn missing_model_is_rejected_before_launch() {
    let ws = Workspace::new();
    let engine = fake_engine(ws.path(), "Slic3r 1.3.0", "exit 0");
    let slicer = ws.slicer(engine, Some("slic3r"));
    let request = SliceRequest::new(ws.path().join("absent.stl"), geometry());
    let err = slicer.slice(&request).unwrap_err();
    assert!(err.is_input_error());
    assert!(slicer.controller().registry().is_empty());
}

#[test]
fn unlaunchable_engine_reports_unknown_error() {
    let ws = Workspace::new();
    // Present but not executable: the spawn itself fails.
    let engine = ws.path().join("slic3r");
    std::fs::write(&engine, "not a program").unwrap();
    std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o644)).unwrap();
    let slicer = ws.slicer(engine, Some("slic3r"));

    let outcome = slicer.slice(&ws.request()).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            exit_code: None,
            diagnostic: UNKNOWN_ERROR.to_owned(),
        }
    );
    assert!(slicer.controller().registry().is_empty());
}

#[test]
fn stalled_help_falls_back_and_slices() {
    let ws = Workspace::new();
    let engine = fake_engine_with_help(ws.path(), "exec sleep 30", WRITES_GCODE);
    let slicer = ws
        .slicer(engine, None)
        .with_help_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let outcome = slicer.slice(&ws.request()).unwrap();
    assert!(outcome.is_success(), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(10));

    let gcode = std::fs::read_to_string(ws.path().join("cube.gco")).unwrap();
    assert!(gcode.contains("; center = 110,90"));
    assert!(!gcode.contains("; loglevel = 3"));
}

#[test]
fn cancel_reaches_job_after_stalled_help() {
    let ws = Workspace::new();
    let engine = fake_engine_with_help(ws.path(), "exec sleep 30", "exec sleep 30");
    let slicer = Arc::new(
        ws.slicer(engine, None)
            .with_help_timeout(Duration::from_millis(300)),
    );
    let output = ws.path().join("cube.gco");
    let request = ws.request();

    let started = Instant::now();
    let worker = {
        let slicer = Arc::clone(&slicer);
        thread::spawn(move || slicer.slice(&request))
    };
    wait_for_state(&slicer, &output, JobState::Running);
    slicer.cancel(&output);

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(slicer.controller().registry().is_empty());
}

#[test]
fn dialect_is_detected_once_per_slicer() {
    let ws = Workspace::new();
    let calls = ws.path().join("help-calls");
    let on_help = format!(
        "echo called >> \"{}\"\n  echo \"Slic3r 1.3.0\"\n  exit 0",
        calls.display()
    );
    let engine = fake_engine_with_help(ws.path(), &on_help, WRITES_GCODE);
    let slicer = ws.slicer(engine, None);

    assert!(slicer.slice(&ws.request()).unwrap().is_success());
    assert!(slicer.slice(&ws.request()).unwrap().is_success());
    assert_eq!(slicer.dialect().unwrap().name(), "slic3r");

    let recorded = std::fs::read_to_string(&calls).unwrap();
    assert_eq!(recorded.lines().count(), 1);
}
