use crate::coerce::{coerce_or_default, infer};
use crate::defaults::ParamTable;
use crate::ini::{parse_profile_file, parse_profile_str, render_profile, write_profile_file, RawProfile};
use crate::value::ParamValue;
use crate::ProfileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Caller-supplied values that take precedence over a stored profile.
pub type Overrides = BTreeMap<String, ParamValue>;

/// A resolved parameter set plus its optional header metadata.
///
/// Built from a table, a stored profile and overrides, with precedence
/// `default < profile < override`.
///
/// Geometry-derived parameters (`print_center`, `nozzle_diameter`) are only
/// present when a file or override set them. [`SliceSettings`] is the total
/// view: it answers every declared parameter for a given printer.
///
/// [`SliceSettings`]: crate::settings::SliceSettings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "data")]
    values: BTreeMap<String, ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Profile {
    /// A profile holding every default of `table`.
    pub fn defaults(table: &ParamTable) -> Self {
        Self::build(table, &RawProfile::default(), None)
    }

    /// Assemble a profile from a parsed file and optional overrides.
    ///
    /// Raw values are coerced against the table; names the table does not
    /// declare are dropped. Derived parameters are only stored when the file or
    /// the overrides supply them. Override-only names are kept.
    pub fn build(table: &ParamTable, raw: &RawProfile, overrides: Option<&Overrides>) -> Self {
        let mut values = BTreeMap::new();

        for def in table.iter() {
            let value = if let Some(v) = overrides.and_then(|o| o.get(&def.name)) {
                if !def.shape.accepts(v) {
                    warn!("override for {} does not match its declared type", def.name);
                }
                Some(v.clone())
            } else if let Some(text) = raw.entries.get(&def.name) {
                coerce_or_default(def, text)
            } else if def.derived {
                None
            } else {
                def.default.clone()
            };

            if let Some(v) = value {
                values.insert(def.name.clone(), v);
            }
        }

        if let Some(overrides) = overrides {
            for (name, value) in overrides {
                values.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }

        let unknown = raw.entries.keys().filter(|k| !table.contains(k)).count();
        if unknown > 0 {
            debug!("ignored {unknown} unknown profile settings");
        }

        Self {
            values,
            display_name: raw.display_name.clone(),
            description: raw.description.clone(),
        }
    }

    /// Keep every raw entry, inferring types without a table.
    ///
    /// Used for engine schemas newer than the built-in table.
    pub fn untyped(raw: &RawProfile) -> Self {
        Self {
            values: raw
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), infer(v)))
                .collect(),
            display_name: raw.display_name.clone(),
            description: raw.description.clone(),
        }
    }

    pub fn parse_str(table: &ParamTable, text: &str) -> Self {
        Self::build(table, &parse_profile_str(text), None)
    }

    pub fn load(table: &ParamTable, path: &Path) -> Result<Self, ProfileError> {
        let raw = parse_profile_file(path)?;
        Ok(Self::build(table, &raw, None))
    }

    /// Apply overrides on top of this profile, replacing existing values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        for (name, value) in overrides {
            self.values.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_ini_string(&self) -> String {
        render_profile(
            &self.values,
            self.display_name.as_deref(),
            self.description.as_deref(),
        )
    }

    pub fn save(&self, path: &Path, allow_overwrite: bool) -> Result<(), ProfileError> {
        write_profile_file(
            path,
            &self.values,
            self.display_name.as_deref(),
            self.description.as_deref(),
            allow_overwrite,
        )
    }
}
