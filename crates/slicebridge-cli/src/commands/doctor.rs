use super::{CommandResult, EXIT_FAILURE, EXIT_SUCCESS};
use slicebridge_core::Slicer;
use std::path::Path;

pub fn run(slicer: &Slicer, config_path: &Path, json_output: bool) -> CommandResult {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    if config_path.is_file() {
        checks.push(Check::pass(
            "config",
            &format!("Configuration loaded from {}", config_path.display()),
        ));
    } else {
        checks.push(Check::info(
            "config",
            &format!("No configuration at {} (using defaults)", config_path.display()),
        ));
    }

    check_engine(slicer, &mut checks, &mut all_pass);
    check_profiles(slicer, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_engine(slicer: &Slicer, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = slicebridge_runtime::check_engine(slicer.config().engine.as_deref());
    if !missing.is_empty() {
        *all_pass = false;
        checks.push(Check::fail(
            "engine",
            &slicebridge_runtime::format_missing(&missing),
        ));
        return;
    }
    if let Some(engine) = &slicer.config().engine {
        checks.push(Check::pass(
            "engine",
            &format!("Engine found at {}", engine.display()),
        ));
    }

    let source = if slicer.config().dialect.is_some() {
        "configured"
    } else {
        "detected"
    };
    match slicer.dialect() {
        Ok(dialect) => checks.push(Check::pass(
            "dialect",
            &format!("Command-line dialect: {} ({source})", dialect.name()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "dialect",
                &format!("Cannot determine command-line dialect: {e}"),
            ));
        }
    }
}

fn check_profiles(slicer: &Slicer, checks: &mut Vec<Check>) {
    match slicer.library().and_then(|library| library.list()) {
        Ok(names) => checks.push(Check::info(
            "profiles",
            &format!("{} stored profiles", names.len()),
        )),
        Err(e) => checks.push(Check::warn(
            "profiles",
            &format!("Cannot list stored profiles: {e}"),
        )),
    }

    match slicer.default_profile_path() {
        Some(path) if path.is_file() => checks.push(Check::pass(
            "default_profile",
            &format!("Default profile: {}", path.display()),
        )),
        Some(path) => checks.push(Check::warn(
            "default_profile",
            &format!("Configured default profile missing: {}", path.display()),
        )),
        None => checks.push(Check::info(
            "default_profile",
            "No default profile (built-in defaults are used)",
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> CommandResult {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("slicebridge doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
