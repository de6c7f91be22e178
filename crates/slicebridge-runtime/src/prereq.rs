use std::fmt;
use std::path::Path;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (fix: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check that the configured engine can be launched.
/// Returns a list of missing items. Empty list means the engine is usable.
pub fn check_engine(executable: Option<&Path>) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    let Some(path) = executable else {
        missing.push(MissingPrereq {
            name: "slicing engine".to_owned(),
            purpose: "no engine executable is configured",
            install_hint: "set `engine` in the config file or SLICEBRIDGE_ENGINE",
        });
        return missing;
    };

    if !path.is_file() {
        missing.push(MissingPrereq {
            name: path.display().to_string(),
            purpose: "configured engine does not exist",
            install_hint: "install Slic3r or PrusaSlicer and point `engine` at its binary",
        });
    } else if !is_executable(path) {
        missing.push(MissingPrereq {
            name: path.display().to_string(),
            purpose: "configured engine is not executable",
            install_hint: "chmod +x the engine binary",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nSlicing requires a Slic3r-compatible engine.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "/opt/slic3r".to_owned(),
            purpose: "configured engine does not exist",
            install_hint: "install it",
        };
        let s = format!("{m}");
        assert!(s.contains("/opt/slic3r"));
        assert!(s.contains("does not exist"));
        assert!(s.contains("install it"));
    }

    #[test]
    fn unconfigured_engine_is_reported() {
        let missing = check_engine(None);
        assert_eq!(missing.len(), 1);
        assert!(format_missing(&missing).contains("no engine executable is configured"));
    }

    #[test]
    fn nonexistent_engine_is_reported() {
        let missing = check_engine(Some(Path::new("/nonexistent/slic3r")));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].purpose, "configured engine does not exist");
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slic3r");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let missing = check_engine(Some(&path));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].purpose, "configured engine is not executable");

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(check_engine(Some(&path)).is_empty());
    }
}
