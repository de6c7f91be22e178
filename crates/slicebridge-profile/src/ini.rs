//! Reader and writer for the engine's line-oriented `key = value` profile files.
//!
//! ```text
//! # Name: PLA draft
//! # Description: fast and coarse
//! layer_height = 0.3
//! perimeters = 2
//! ```

use crate::value::ParamValue;
use crate::ProfileError;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub const NAME_MARKER: &str = "# Name: ";
pub const DESCRIPTION_MARKER: &str = "# Description: ";
const COMMENT: u8 = b'#';

/// Keys with this prefix are bookkeeping and never written out.
pub const INTERNAL_PREFIX: char = '_';

/// Untyped result of reading a profile file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProfile {
    pub entries: BTreeMap<String, String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

pub fn parse_profile_str(text: &str) -> RawProfile {
    let mut raw = RawProfile::default();

    for line in text.lines() {
        if let Some(name) = line.strip_prefix(NAME_MARKER) {
            raw.display_name.get_or_insert_with(|| header_value(name));
        } else if let Some(description) = line.strip_prefix(DESCRIPTION_MARKER) {
            raw.description
                .get_or_insert_with(|| header_value(description));
        }

        let Some((key, value)) = strip_comment(line).split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        raw.entries.insert(key.to_owned(), value.trim().to_owned());
    }

    raw
}

pub fn parse_profile_file(path: &Path) -> Result<RawProfile, ProfileError> {
    if !path.is_file() {
        return Err(ProfileError::NotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    let raw = parse_profile_str(&text);
    debug!(
        "read {} entries from profile {}",
        raw.entries.len(),
        path.display()
    );
    Ok(raw)
}

fn header_value(rest: &str) -> String {
    rest.trim_end_matches(['\r', '\n']).to_owned()
}

fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    (0..bytes.len()).find(|&i| bytes[i] == COMMENT && (i == 0 || bytes[i - 1] != b'\\'))
}

/// Drop a trailing comment.
///
/// A `#` that directly opens a value (`extrusion_color = #FF8000`) is kept, so
/// `key = # note` also survives as the value `# note`. Values with a `#` after
/// other text are cut at the `#`.
fn strip_comment(line: &str) -> &str {
    let Some(idx) = comment_start(line) else {
        return line;
    };
    let head = &line[..idx];
    match head.split_once('=') {
        Some((_, value)) if value.trim().is_empty() => line,
        _ => head,
    }
}

/// Render values in lexicographic key order with optional header comments.
pub fn render_profile(
    values: &BTreeMap<String, ParamValue>,
    display_name: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(name) = display_name {
        let _ = writeln!(out, "{NAME_MARKER}{name}");
    }
    if let Some(description) = description {
        let _ = writeln!(out, "{DESCRIPTION_MARKER}{description}");
    }
    for (key, value) in values {
        if key.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        let _ = writeln!(out, "{key} = {value}");
    }
    out
}

/// Atomically write a rendered profile to `path`.
///
/// With `allow_overwrite == false` an existing file at `path` is left alone
/// and [`ProfileError::AlreadyExists`] is returned.
pub fn write_profile_file(
    path: &Path,
    values: &BTreeMap<String, ParamValue>,
    display_name: Option<&str>,
    description: Option<&str>,
    allow_overwrite: bool,
) -> Result<(), ProfileError> {
    if !allow_overwrite && path.exists() {
        return Err(ProfileError::AlreadyExists(path.display().to_string()));
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let content = render_profile(values, display_name, description);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    if allow_overwrite {
        tmp.persist(path).map_err(|e| ProfileError::Io(e.error))?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                ProfileError::AlreadyExists(path.display().to_string())
            } else {
                ProfileError::Io(e.error)
            }
        })?;
    }

    debug!("wrote profile {}", path.display());
    Ok(())
}
