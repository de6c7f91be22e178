//! Print summary the engine appends to its G-code as `; key = value` comments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilamentUsage {
    /// Millimetres of filament.
    pub length: f64,
    /// Cubic centimetres, when the engine reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_print_time: Option<String>,
    /// Keyed `tool0`, `tool1`, ...
    #[serde(default)]
    pub filament: BTreeMap<String, FilamentUsage>,
}

impl SliceMetadata {
    pub fn is_empty(&self) -> bool {
        self.estimated_print_time.is_none() && self.filament.is_empty()
    }
}

fn tool_key(index: usize) -> String {
    format!("tool{index}")
}

fn parse_numbers(list: &str) -> Vec<f64> {
    list.split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect()
}

/// `1234.5mm (9.8cm3)` as written by classic Slic3r.
fn parse_legacy_filament(value: &str) -> Option<FilamentUsage> {
    let (length, rest) = value.split_once("mm")?;
    let length = length.trim().parse::<f64>().ok()?;
    let volume = rest
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.split_once("cm3"))
        .and_then(|(v, _)| v.trim().parse::<f64>().ok());
    Some(FilamentUsage { length, volume })
}

fn split_comment(line: &str) -> Option<(&str, &str)> {
    let body = line.trim().strip_prefix(';')?;
    let (key, value) = body.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Extract the summary from G-code text. `None` when no summary comment is found.
pub fn parse_metadata<I, S>(lines: I) -> Option<SliceMetadata>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut meta = SliceMetadata::default();
    let mut lengths: Vec<f64> = Vec::new();
    let mut volumes: Vec<f64> = Vec::new();
    let mut legacy: Vec<FilamentUsage> = Vec::new();

    for line in lines {
        let Some((key, value)) = split_comment(line.as_ref()) else {
            continue;
        };
        match key {
            "estimated printing time" | "estimated printing time (normal mode)" => {
                if meta.estimated_print_time.is_none() {
                    meta.estimated_print_time = Some(value.to_owned());
                }
            }
            "filament used [mm]" => lengths = parse_numbers(value),
            "filament used [cm3]" => volumes = parse_numbers(value),
            "filament used" => {
                if let Some(usage) = parse_legacy_filament(value) {
                    legacy.push(usage);
                }
            }
            _ => {}
        }
    }

    if lengths.is_empty() {
        for (i, usage) in legacy.into_iter().enumerate() {
            meta.filament.insert(tool_key(i), usage);
        }
    } else {
        for (i, length) in lengths.into_iter().enumerate() {
            meta.filament.insert(
                tool_key(i),
                FilamentUsage {
                    length,
                    volume: volumes.get(i).copied(),
                },
            );
        }
    }

    if meta.is_empty() {
        None
    } else {
        Some(meta)
    }
}

/// Read the summary from a G-code file. Missing or unreadable files yield `None`.
pub fn extract_metadata(gcode: &Path) -> Option<SliceMetadata> {
    let file = match File::open(gcode) {
        Ok(f) => f,
        Err(e) => {
            debug!("no metadata from {}: {e}", gcode.display());
            return None;
        }
    };
    let lines = BufReader::new(file)
        .split(b'\n')
        .map_while(Result::ok)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    parse_metadata(lines)
}
