//! Conversion of raw profile text into typed parameter values.

use crate::defaults::ParamDef;
use crate::value::{ParamShape, ParamValue, LIST_SEPARATOR};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoerceError {
    #[error("'{raw}' is not a valid {expected}")]
    Invalid { raw: String, expected: &'static str },
    #[error("no reference value for tuple component {index}")]
    MissingReference { index: usize },
}

fn invalid(raw: &str, expected: &'static str) -> CoerceError {
    CoerceError::Invalid {
        raw: raw.to_owned(),
        expected,
    }
}

/// Coerce `raw` into a value of `shape`.
///
/// `reference` is the parameter's default; tuples use it to fill components
/// the raw text does not supply.
pub fn coerce(
    shape: &ParamShape,
    raw: &str,
    reference: Option<&ParamValue>,
) -> Result<ParamValue, CoerceError> {
    match shape {
        ParamShape::PercentOrNumber => coerce_percent_or_number(raw),
        ParamShape::Bool => Ok(ParamValue::Bool(parse_flag(raw))),
        ParamShape::Int => {
            if let Ok(i) = raw.parse::<i64>() {
                Ok(ParamValue::Int(i))
            } else {
                // Engines emit fractional values for keys with integer defaults.
                raw.parse::<f64>()
                    .map(ParamValue::Float)
                    .map_err(|_| invalid(raw, "integer"))
            }
        }
        ParamShape::Float => raw
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| invalid(raw, "number")),
        ParamShape::Text => Ok(ParamValue::Text(raw.to_owned())),
        ParamShape::Tuple(shapes) => coerce_tuple(shapes, raw, reference),
    }
}

fn coerce_percent_or_number(raw: &str) -> Result<ParamValue, CoerceError> {
    if raw.ends_with('%') {
        return Ok(ParamValue::Text(raw.to_owned()));
    }
    if raw.contains('.') {
        return raw
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| invalid(raw, "number or percentage"));
    }
    match raw.parse::<i64>() {
        Ok(i) => Ok(ParamValue::Int(i)),
        Err(_) => raw
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| invalid(raw, "number or percentage")),
    }
}

fn coerce_tuple(
    shapes: &[ParamShape],
    raw: &str,
    reference: Option<&ParamValue>,
) -> Result<ParamValue, CoerceError> {
    let reference = reference.and_then(ParamValue::as_list).unwrap_or(&[]);
    let parts: Vec<&str> = raw.split(LIST_SEPARATOR).map(str::trim).collect();

    let mut items = Vec::with_capacity(shapes.len());
    for (index, shape) in shapes.iter().enumerate() {
        let item = match parts.get(index) {
            Some(part) => coerce(shape, part, reference.get(index))?,
            None => reference
                .get(index)
                .cloned()
                .ok_or(CoerceError::MissingReference { index })?,
        };
        items.push(item);
    }
    Ok(ParamValue::List(items))
}

/// Lenient boolean reading: only an explicit "off" token is false.
///
/// Slic3r writes `0`/`1`, this bridge writes `false`/`true`; anything else
/// that is present counts as set.
pub fn parse_flag(raw: &str) -> bool {
    let token = raw.trim();
    !(token.is_empty()
        || token == "0"
        || token.eq_ignore_ascii_case("false")
        || token.eq_ignore_ascii_case("no")
        || token.eq_ignore_ascii_case("off"))
}

/// Coerce against a table declaration, degrading to the declared default on
/// failure. Never fails; failures are logged.
///
/// Derived parameters degrade to `None` so the geometry keeps supplying them.
pub fn coerce_or_default(def: &ParamDef, raw: &str) -> Option<ParamValue> {
    match coerce(&def.shape, raw, def.default.as_ref()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "could not convert value for {} from imported profile, using default: {e}",
                def.name
            );
            if def.derived {
                None
            } else {
                def.default.clone()
            }
        }
    }
}

/// Schema-less coercion: integer, then float, then text.
pub fn infer(raw: &str) -> ParamValue {
    if let Ok(i) = raw.parse::<i64>() {
        ParamValue::Int(i)
    } else if let Ok(x) = raw.parse::<f64>() {
        ParamValue::Float(x)
    } else {
        ParamValue::Text(raw.to_owned())
    }
}
