use crate::process::{spawn_engine, Pumped};
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long `--help` may run before detection gives up on it.
pub const HELP_TIMEOUT: Duration = Duration::from_secs(5);
const HELP_POLL: Duration = Duration::from_millis(50);

/// Everything needed to slice one model.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceInvocation {
    pub executable: PathBuf,
    pub profile_path: PathBuf,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    /// Object placement on the bed, in millimetres.
    pub center: (f64, f64),
}

/// A fully rendered engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

impl EngineCommand {
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = format!("{:?}", self.program.display().to_string());
        for arg in &self.args {
            out.push(' ');
            if arg.contains(' ') {
                out.push_str(&format!("{arg:?}"));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// One command-line dialect of the Slic3r engine family.
pub trait CommandBuilder: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, invocation: &SliceInvocation) -> EngineCommand;
}

fn working_dir_of(executable: &Path) -> Option<PathBuf> {
    executable
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn format_center((x, y): (f64, f64)) -> String {
    format!("{x},{y}")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Classic Slic3r (1.x): `--print-center`, `-o`, no environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct Slic3rDialect;

impl CommandBuilder for Slic3rDialect {
    fn name(&self) -> &str {
        "slic3r"
    }

    fn build(&self, inv: &SliceInvocation) -> EngineCommand {
        EngineCommand {
            program: inv.executable.clone(),
            args: vec![
                "--load".to_owned(),
                path_arg(&inv.profile_path),
                "--print-center".to_owned(),
                format_center(inv.center),
                "-o".to_owned(),
                path_arg(&inv.output_path),
                path_arg(&inv.model_path),
            ],
            env: Vec::new(),
            working_dir: working_dir_of(&inv.executable),
        }
    }
}

/// PrusaSlicer-style CLI: explicit `--export-gcode` action, `--center`,
/// `--output`, and log verbosity through `SLIC3R_LOGLEVEL`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrusaDialect;

pub const PRUSA_LOGLEVEL_VAR: &str = "SLIC3R_LOGLEVEL";
const PRUSA_LOGLEVEL: &str = "3";

impl CommandBuilder for PrusaDialect {
    fn name(&self) -> &str {
        "prusa"
    }

    fn build(&self, inv: &SliceInvocation) -> EngineCommand {
        EngineCommand {
            program: inv.executable.clone(),
            args: vec![
                "--export-gcode".to_owned(),
                "--load".to_owned(),
                path_arg(&inv.profile_path),
                "--center".to_owned(),
                format_center(inv.center),
                "--output".to_owned(),
                path_arg(&inv.output_path),
                path_arg(&inv.model_path),
            ],
            env: vec![(PRUSA_LOGLEVEL_VAR.to_owned(), PRUSA_LOGLEVEL.to_owned())],
            working_dir: working_dir_of(&inv.executable),
        }
    }
}

pub fn select_dialect(name: &str) -> Result<Box<dyn CommandBuilder>, RuntimeError> {
    match name {
        "slic3r" => Ok(Box::new(Slic3rDialect)),
        "prusa" => Ok(Box::new(PrusaDialect)),
        other => Err(RuntimeError::UnknownDialect(other.to_owned())),
    }
}

/// Pick the dialect whose vocabulary appears in `--help` output.
pub fn dialect_from_help(help: &str) -> Box<dyn CommandBuilder> {
    if help.contains("--export-gcode") || help.contains("PrusaSlicer") || help.contains("SuperSlicer")
    {
        Box::new(PrusaDialect)
    } else {
        Box::new(Slic3rDialect)
    }
}

/// Run `<executable> --help` and pick the matching dialect.
pub fn detect_dialect(executable: &Path) -> Result<Box<dyn CommandBuilder>, RuntimeError> {
    detect_dialect_within(executable, HELP_TIMEOUT)
}

/// Like [`detect_dialect`], but an engine still running after `timeout` is
/// killed and classic Slic3r is assumed.
pub fn detect_dialect_within(
    executable: &Path,
    timeout: Duration,
) -> Result<Box<dyn CommandBuilder>, RuntimeError> {
    if !executable.is_file() {
        return Err(RuntimeError::EngineNotFound(
            executable.display().to_string(),
        ));
    }

    let command = EngineCommand {
        program: executable.to_path_buf(),
        args: vec!["--help".to_owned()],
        env: Vec::new(),
        working_dir: working_dir_of(executable),
    };
    let (handle, pump) = spawn_engine(&command)?;
    let deadline = Instant::now() + timeout;
    let mut help = String::new();
    let mut closed = false;

    loop {
        if closed && handle.try_wait()?.is_some() {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                "{} --help did not finish within {}s, assuming slic3r dialect",
                executable.display(),
                timeout.as_secs_f64()
            );
            handle.kill_and_wait()?;
            return Ok(Box::new(Slic3rDialect));
        }
        if closed {
            thread::sleep(remaining.min(HELP_POLL));
            continue;
        }
        match pump.next(remaining) {
            Pumped::Line(line) => {
                help.push_str(line.text());
                help.push('\n');
            }
            Pumped::Idle => {}
            Pumped::Closed => closed = true,
        }
    }

    let dialect = dialect_from_help(&help);
    debug!(
        "detected {} dialect for {}",
        dialect.name(),
        executable.display()
    );
    Ok(dialect)
}
