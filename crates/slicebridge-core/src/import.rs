//! Turning an uploaded or server-local engine profile into a stored profile.

use crate::library::ProfileLibrary;
use crate::CoreError;
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use slicebridge_profile::{
    parse_profile_file, parse_profile_str, sanitize_profile_name, ParamTable, Profile,
};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub enum ImportSource {
    /// Profile text sent by the client, with the client's file name.
    Upload { filename: String, contents: String },
    /// A file already present on this machine.
    Path(PathBuf),
}

impl ImportSource {
    fn filename(&self) -> String {
        match self {
            Self::Upload { filename, .. } => filename.clone(),
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// An import plus the caller's explicit choices, each overriding what the
/// file itself would suggest.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub source: ImportSource,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub allow_overwrite: bool,
}

impl ImportRequest {
    pub fn new(source: ImportSource) -> Self {
        Self {
            source,
            name: None,
            display_name: None,
            description: None,
            allow_overwrite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedProfile {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(skip)]
    pub path: PathBuf,
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Parse, name, and store an imported profile.
///
/// Display name falls back to the file's `# Name:` header, then the file
/// stem. Description falls back to the `# Description:` header, then an
/// "Imported from" note stamped with `now`.
pub fn import_profile<Tz>(
    library: &ProfileLibrary,
    table: &ParamTable,
    request: &ImportRequest,
    now: &DateTime<Tz>,
) -> Result<ImportedProfile, CoreError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let filename = request.source.filename();
    if filename.is_empty() {
        return Err(CoreError::InvalidInput("No file included".to_owned()));
    }

    let raw = match &request.source {
        ImportSource::Upload { contents, .. } => parse_profile_str(contents),
        ImportSource::Path(path) => parse_profile_file(path)?,
    };
    let mut profile = Profile::build(table, &raw, None);

    let stem = file_stem(&filename);
    let name = sanitize_profile_name(request.name.as_deref().unwrap_or(stem))?;
    let display_name = request
        .display_name
        .clone()
        .or_else(|| raw.display_name.clone())
        .unwrap_or_else(|| stem.to_owned());
    let description = request
        .description
        .clone()
        .or_else(|| raw.description.clone())
        .unwrap_or_else(|| {
            format!(
                "Imported from {filename} on {}",
                now.format("%Y-%m-%d %H:%M")
            )
        });

    profile.display_name = Some(display_name.clone());
    profile.description = Some(description.clone());
    let path = library.save(&name, &profile, request.allow_overwrite)?;
    info!("imported {filename} as profile {name}");

    Ok(ImportedProfile {
        name,
        display_name,
        description,
        path,
    })
}
