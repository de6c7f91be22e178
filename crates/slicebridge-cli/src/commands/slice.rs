use super::{
    colorize_status, json_pretty, overrides_from, spin_fail, spin_ok, spinner, CommandResult,
    PrinterArgs, EXIT_CANCELLED, EXIT_FAILURE, EXIT_SUCCESS,
};
use slicebridge_core::{JobOutcome, SliceRequest, Slicer};
use slicebridge_runtime::SliceMetadata;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C cancels the job for `output`; a second one exits immediately.
fn install_cancel_handler(slicer: &Arc<Slicer>, output: &Path) {
    let slicer = Arc::clone(slicer);
    let output = output.to_path_buf();
    let _ = ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(EXIT_CANCELLED));
        }
        eprintln!("\ncancel requested, stopping the engine...");
        slicer.cancel(&output);
    });
}

pub struct SliceArgs<'a> {
    pub model: &'a Path,
    pub output: Option<&'a Path>,
    pub profile: Option<&'a Path>,
    pub printer: &'a PrinterArgs,
    pub overrides: &'a [(String, String)],
}

pub fn run(slicer: &Arc<Slicer>, args: &SliceArgs<'_>, json: bool) -> CommandResult {
    let mut request = SliceRequest::new(args.model, args.printer.geometry());
    request.output = args.output.map(Path::to_path_buf);
    request.profile = args.profile.map(Path::to_path_buf);
    request.position = args.printer.position;
    request.overrides = overrides_from(slicer.table(), args.overrides);
    let output = request.output_path();

    install_cancel_handler(slicer, &output);

    let pb = (!json).then(|| spinner(&format!("slicing {}", args.model.display())));
    let outcome = match slicer.slice(&request) {
        Ok(o) => o,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "slicing could not start");
            }
            return Err(e.into());
        }
    };

    if json {
        print_json(&output, &outcome)?;
    } else if let Some(pb) = &pb {
        print_human(pb, &output, &outcome);
    }

    Ok(match outcome {
        JobOutcome::Succeeded { .. } => EXIT_SUCCESS,
        JobOutcome::Failed { .. } => EXIT_FAILURE,
        JobOutcome::Cancelled => EXIT_CANCELLED,
    })
}

fn print_json(output: &Path, outcome: &JobOutcome) -> Result<(), String> {
    let mut value = serde_json::to_value(outcome).map_err(|e| e.to_string())?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "output".to_owned(),
            serde_json::Value::String(output.display().to_string()),
        );
    }
    println!("{}", json_pretty(&value)?);
    Ok(())
}

fn print_human(pb: &indicatif::ProgressBar, output: &Path, outcome: &JobOutcome) {
    let status = colorize_status(&outcome.state().to_string());
    match outcome {
        JobOutcome::Succeeded { metadata } => {
            spin_ok(pb, &format!("{status}: {}", output.display()));
            if let Some(metadata) = metadata {
                print_metadata(metadata);
            }
        }
        JobOutcome::Failed {
            exit_code,
            diagnostic,
        } => {
            let code = exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string());
            spin_fail(pb, &format!("{status} (exit code {code}): {diagnostic}"));
        }
        JobOutcome::Cancelled => spin_fail(pb, &status),
    }
}

fn print_metadata(metadata: &SliceMetadata) {
    if let Some(time) = &metadata.estimated_print_time {
        println!("  print time:  {time}");
    }
    for (tool, usage) in &metadata.filament {
        match usage.volume {
            Some(volume) => println!("  {tool}:       {:.1} mm ({volume:.1} cm3)", usage.length),
            None => println!("  {tool}:       {:.1} mm", usage.length),
        }
    }
}

