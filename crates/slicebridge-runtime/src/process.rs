//! Engine process spawning and supervision primitives.

use crate::dialect::EngineCommand;
use crate::RuntimeError;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One line of engine output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            Self::Stdout(s) | Self::Stderr(s) => s,
        }
    }
}

/// Result of one pump step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pumped {
    Line(OutputLine),
    /// Nothing arrived within the timeout.
    Idle,
    /// Both streams reached end of file.
    Closed,
}

/// Merged stdout/stderr of a running engine, read line by line.
///
/// Each stream is drained by its own reader thread so neither pipe can fill
/// up and block the engine.
#[derive(Debug)]
pub struct OutputPump {
    rx: Receiver<OutputLine>,
}

impl OutputPump {
    pub fn next(&self, timeout: Duration) -> Pumped {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Pumped::Line(line),
            Err(RecvTimeoutError::Timeout) => Pumped::Idle,
            Err(RecvTimeoutError::Disconnected) => Pumped::Closed,
        }
    }
}

fn trim_line_end(buf: &mut Vec<u8>) {
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
}

fn spawn_reader<R, F>(name: &str, stream: R, tx: Sender<OutputLine>, wrap: F) -> Result<(), RuntimeError>
where
    R: Read + Send + 'static,
    F: Fn(String) -> OutputLine + Send + 'static,
{
    thread::Builder::new()
        .name(format!("engine-{name}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        trim_line_end(&mut buf);
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(wrap(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("engine output stream closed: {e}");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(|e| RuntimeError::SpawnFailed(format!("output reader thread: {e}")))
}

/// Start the engine with piped output.
pub fn spawn_engine(command: &EngineCommand) -> Result<(EngineHandle, OutputPump), RuntimeError> {
    let mut cmd = command.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        RuntimeError::SpawnFailed(format!("{}: {e}", command.program.display()))
    })?;
    let pid = child.id();
    debug!("engine started with pid {pid}");

    let (tx, rx) = mpsc::channel();
    let started = match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => spawn_reader("stdout", out, tx.clone(), OutputLine::Stdout)
            .and_then(|()| spawn_reader("stderr", err, tx, OutputLine::Stderr)),
        _ => Err(RuntimeError::SpawnFailed(
            "engine output pipes unavailable".to_owned(),
        )),
    };
    if let Err(e) = started {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    let handle = EngineHandle {
        child: Mutex::new(child),
        pid,
        terminate_requested: OnceLock::new(),
    };
    Ok((handle, OutputPump { rx }))
}

/// Shareable handle to a running engine process.
///
/// The supervising thread polls it for exit while other threads may ask it
/// to terminate.
#[derive(Debug)]
pub struct EngineHandle {
    child: Mutex<Child>,
    pid: u32,
    terminate_requested: OnceLock<Instant>,
}

impl EngineHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn lock(&self) -> Result<MutexGuard<'_, Child>, RuntimeError> {
        self.child
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    pub fn try_wait(&self) -> Result<Option<ExitStatus>, RuntimeError> {
        Ok(self.lock()?.try_wait()?)
    }

    /// Block until the process exits.
    pub fn wait(&self) -> Result<ExitStatus, RuntimeError> {
        Ok(self.lock()?.wait()?)
    }

    /// When termination was first requested, if ever.
    pub fn terminate_requested_at(&self) -> Option<Instant> {
        self.terminate_requested.get().copied()
    }

    /// Ask the engine to stop. Does nothing if it already exited.
    pub fn terminate(&self) -> Result<(), RuntimeError> {
        self.terminate_requested.get_or_init(Instant::now);
        let mut child = self.lock()?;
        if child.try_wait()?.is_some() {
            debug!("pid {} already exited, nothing to terminate", self.pid);
            return Ok(());
        }
        send_terminate(&mut child, self.pid)
    }

    /// Force the engine down.
    pub fn kill(&self) -> Result<(), RuntimeError> {
        let mut child = self.lock()?;
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        warn!("engine pid {} did not exit after SIGTERM, killing it", self.pid);
        match child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Kill the engine and reap it, so no zombie outlives the handle.
    pub fn kill_and_wait(&self) -> Result<ExitStatus, RuntimeError> {
        let mut child = self.lock()?;
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        debug!("killing engine pid {}", self.pid);
        match child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        Ok(child.wait()?)
    }
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: u32) -> Result<(), RuntimeError> {
    let pid_i32 = i32::try_from(pid)
        .map_err(|_| RuntimeError::ExecFailed(format!("invalid pid {pid}: exceeds i32 range")))?;
    debug!("sending SIGTERM to pid {pid}");
    // SAFETY: kill() with a valid pid and signal is safe; the child has not been reaped
    // (checked under the same lock), so the pid still names it.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid_i32, libc::SIGTERM) };
    if ret != 0 {
        let errno = std::io::Error::last_os_error();
        if errno.raw_os_error() == Some(libc::ESRCH) {
            debug!("pid {pid} already exited before SIGTERM");
        } else {
            return Err(RuntimeError::ExecFailed(format!(
                "failed to send SIGTERM to pid {pid}: {errno}"
            )));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, pid: u32) -> Result<(), RuntimeError> {
    debug!("terminating pid {pid}");
    match child.kill() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell(script: &str) -> EngineCommand {
        EngineCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_owned(), script.to_owned()],
            env: Vec::new(),
            working_dir: None,
        }
    }

    fn collect(pump: &OutputPump) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        loop {
            match pump.next(Duration::from_secs(5)) {
                Pumped::Line(line) => lines.push(line),
                Pumped::Idle => panic!("engine output stalled"),
                Pumped::Closed => return lines,
            }
        }
    }

    #[test]
    fn pumps_both_streams() {
        let (handle, pump) = spawn_engine(&shell("echo one; echo two >&2; printf 'three\\r\\n'"))
            .unwrap();
        let lines = collect(&pump);
        assert!(lines.contains(&OutputLine::Stdout("one".to_owned())));
        assert!(lines.contains(&OutputLine::Stderr("two".to_owned())));
        assert!(lines.contains(&OutputLine::Stdout("three".to_owned())));
        assert!(handle.wait().unwrap().success());
    }

    #[test]
    fn exit_code_is_reported() {
        let (handle, pump) = spawn_engine(&shell("exit 3")).unwrap();
        assert!(collect(&pump).is_empty());
        assert_eq!(handle.wait().unwrap().code(), Some(3));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let (handle, pump) = spawn_engine(&shell("printf 'caf\\351\\n'")).unwrap();
        let lines = collect(&pump);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text().starts_with("caf"));
        handle.wait().unwrap();
    }

    #[test]
    fn terminate_stops_a_sleeping_engine() {
        let (handle, _pump) = spawn_engine(&shell("exec sleep 30")).unwrap();
        assert!(handle.terminate_requested_at().is_none());
        handle.terminate().unwrap();
        let status = handle.wait().unwrap();
        assert!(!status.success());
        assert!(handle.terminate_requested_at().is_some());
    }

    #[test]
    fn kill_and_wait_reaps_the_engine() {
        let (handle, _pump) = spawn_engine(&shell("exec sleep 30")).unwrap();
        let pid = i32::try_from(handle.pid()).unwrap();
        let status = handle.kill_and_wait().unwrap();
        assert!(!status.success());

        // A zombie still answers signal 0; a reaped pid does not.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::kill(pid, 0) };
        assert_eq!(ret, -1);
        assert!(handle.try_wait().unwrap().is_some());
        assert_eq!(handle.kill_and_wait().unwrap(), status);
    }

    #[test]
    fn terminate_after_exit_is_a_no_op() {
        let (handle, pump) = spawn_engine(&shell("true")).unwrap();
        collect(&pump);
        handle.wait().unwrap();
        handle.terminate().unwrap();
        handle.kill().unwrap();
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let cmd = EngineCommand {
            program: PathBuf::from("/nonexistent/slic3r"),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        };
        assert!(matches!(
            spawn_engine(&cmd),
            Err(RuntimeError::SpawnFailed(_))
        ));
    }
}
