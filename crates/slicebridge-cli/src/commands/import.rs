use super::{json_pretty, CommandResult, EXIT_SUCCESS};
use slicebridge_core::{import_profile, ImportRequest, ImportSource, Slicer};
use std::path::Path;

pub struct ImportArgs<'a> {
    pub file: &'a Path,
    pub name: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub force: bool,
}

pub fn run(slicer: &Slicer, args: &ImportArgs<'_>, json: bool) -> CommandResult {
    let mut request = ImportRequest::new(ImportSource::Path(args.file.to_path_buf()));
    request.name = args.name.map(str::to_owned);
    request.display_name = args.display_name.map(str::to_owned);
    request.description = args.description.map(str::to_owned);
    request.allow_overwrite = args.force;

    let library = slicer.library()?;
    let imported = import_profile(&library, slicer.table(), &request, &chrono::Local::now())?;

    if json {
        let value = serde_json::json!({
            "name": imported.name,
            "displayName": imported.display_name,
            "description": imported.description,
            "path": imported.path,
        });
        println!("{}", json_pretty(&value)?);
    } else {
        println!(
            "imported '{}' as {} ({})",
            imported.display_name,
            imported.name,
            imported.path.display()
        );
    }
    Ok(EXIT_SUCCESS)
}
