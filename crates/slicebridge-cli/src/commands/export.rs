use super::{load_profile, overrides_from, CommandResult, EXIT_SUCCESS};
use slicebridge_core::Slicer;
use std::path::Path;

/// Write a profile as an engine-readable file, optionally with overrides merged in.
pub fn run(
    slicer: &Slicer,
    profile: Option<&str>,
    destination: &Path,
    overrides: &[(String, String)],
    force: bool,
) -> CommandResult {
    let loaded = load_profile(slicer, profile)?;
    let overrides = overrides_from(slicer.table(), overrides);
    let overrides = (!overrides.is_empty()).then_some(&overrides);
    slicer.save_profile(destination, &loaded, force, overrides)?;
    println!("wrote {}", destination.display());
    Ok(EXIT_SUCCESS)
}
