//! Rendering of resolved settings into the engine's `--flag value` vocabulary.

use crate::settings::SliceSettings;
use crate::value::ParamValue;
use std::collections::BTreeMap;

/// Flag name of a parameter on the engine command line.
pub fn engine_flag_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Map every declared parameter to its engine argument.
///
/// A `None` value marks a bare flag (boolean true). False booleans and
/// parameters that resolve to nothing are left out.
pub fn to_engine_args(settings: &SliceSettings<'_>) -> BTreeMap<String, Option<String>> {
    let mut args = BTreeMap::new();
    for def in settings.table().iter() {
        let Some(value) = settings.get(&def.name) else {
            continue;
        };
        let arg = match value {
            ParamValue::Bool(false) => continue,
            ParamValue::Bool(true) => None,
            other => Some(other.to_string()),
        };
        args.insert(engine_flag_name(&def.name), arg);
    }
    args
}

/// Flatten engine arguments into command-line words.
pub fn to_command_words(args: &BTreeMap<String, Option<String>>) -> Vec<String> {
    let mut words = Vec::with_capacity(args.len() * 2);
    for (flag, value) in args {
        words.push(format!("--{flag}"));
        if let Some(value) = value {
            words.push(value.clone());
        }
    }
    words
}
