use super::{json_pretty, load_profile, CommandResult, EXIT_SUCCESS};
use slicebridge_core::{CoreError, Slicer};
use slicebridge_profile::{parse_profile_file, Profile};
use std::path::{Path, PathBuf};

pub fn run(slicer: &Slicer, profile: Option<&str>, raw: bool, json: bool) -> CommandResult {
    let loaded = if raw {
        load_untyped(slicer, profile)?
    } else {
        load_profile(slicer, profile)?
    };
    if json {
        println!("{}", json_pretty(&loaded)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("name:        {}", loaded.display_name.as_deref().unwrap_or("(none)"));
    println!(
        "description: {}",
        loaded.description.as_deref().unwrap_or("(none)")
    );
    println!("parameters:  {}", loaded.len());
    println!();
    for (key, value) in loaded.values() {
        println!("{key} = {value}");
    }
    Ok(EXIT_SUCCESS)
}

/// Every entry of the file as written, without the default table.
fn load_untyped(slicer: &Slicer, profile: Option<&str>) -> Result<Profile, CoreError> {
    let path: PathBuf = match profile {
        Some(p) if Path::new(p).is_file() => PathBuf::from(p),
        Some(name) => slicer.library()?.path_for(name)?,
        None => slicer.default_profile_path().ok_or_else(|| {
            CoreError::InvalidInput("--raw needs a profile file or a default profile".to_owned())
        })?,
    };
    Ok(Profile::untyped(&parse_profile_file(&path)?))
}
