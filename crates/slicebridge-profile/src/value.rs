//! Typed parameter values and the shapes that drive their coercion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the components of list-valued parameters, both in
/// profile files and on the engine command line.
pub const LIST_SEPARATOR: char = ',';

/// A single typed parameter value.
///
/// Serializes untagged, so JSON consumers see plain booleans, numbers, strings
/// and arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value. Percentages and other text yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, Self::Text(s) if s.ends_with('%'))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("true"),
            Self::Bool(false) => f.write_str("false"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug formatting keeps the fractional part ("1.0", not "1"), so a
            // float survives a write/parse cycle as a float.
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{LIST_SEPARATOR}")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Declared type of a parameter, used to coerce raw profile text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamShape {
    Bool,
    Int,
    Float,
    Text,
    /// A speed or width that is either absolute or relative (`"70%"`).
    PercentOrNumber,
    /// Fixed-length tuple; each component has its own shape.
    Tuple(Vec<ParamShape>),
}

impl ParamShape {
    /// Infer the shape a value would have been declared with.
    pub fn of(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(_) => Self::Bool,
            ParamValue::Int(_) => Self::Int,
            ParamValue::Float(_) => Self::Float,
            ParamValue::Text(_) => Self::Text,
            ParamValue::List(items) => Self::Tuple(items.iter().map(Self::of).collect()),
        }
    }

    /// Whether `value` is acceptable for a parameter of this shape.
    ///
    /// Integers are accepted where floats are declared and vice versa, matching
    /// the widening coercion applies to legacy integer defaults.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Self::Bool, ParamValue::Bool(_))
            | (Self::Int | Self::Float, ParamValue::Int(_) | ParamValue::Float(_))
            | (Self::Text, ParamValue::Text(_)) => true,
            (Self::PercentOrNumber, v) => {
                v.is_percentage() || matches!(v, ParamValue::Int(_) | ParamValue::Float(_))
            }
            (Self::Tuple(shapes), ParamValue::List(items)) => {
                shapes.len() == items.len()
                    && shapes.iter().zip(items).all(|(s, v)| s.accepts(v))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_engine_text() {
        assert_eq!(ParamValue::Bool(true).to_string(), "true");
        assert_eq!(ParamValue::Bool(false).to_string(), "false");
        assert_eq!(ParamValue::Int(-5).to_string(), "-5");
        assert_eq!(ParamValue::Float(0.2).to_string(), "0.2");
        assert_eq!(ParamValue::text("70%").to_string(), "70%");
        let list = ParamValue::List(vec![ParamValue::Int(100), ParamValue::Float(50.5)]);
        assert_eq!(list.to_string(), "100,50.5");
    }

    #[test]
    fn whole_floats_keep_their_fraction() {
        assert_eq!(ParamValue::Float(1.0).to_string(), "1.0");
    }

    #[test]
    fn json_is_untagged() {
        let v = ParamValue::List(vec![ParamValue::Int(1), ParamValue::text("x")]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[1,"x"]"#);
        let back: ParamValue = serde_json::from_str("0.35").unwrap();
        assert_eq!(back, ParamValue::Float(0.35));
        let back: ParamValue = serde_json::from_str("3").unwrap();
        assert_eq!(back, ParamValue::Int(3));
        let back: ParamValue = serde_json::from_str("true").unwrap();
        assert_eq!(back, ParamValue::Bool(true));
    }

    #[test]
    fn shape_of_tuple() {
        let v = ParamValue::List(vec![ParamValue::Int(1), ParamValue::Float(2.0)]);
        assert_eq!(
            ParamShape::of(&v),
            ParamShape::Tuple(vec![ParamShape::Int, ParamShape::Float])
        );
    }

    #[test]
    fn percent_shape_accepts_numbers_and_percentages() {
        let shape = ParamShape::PercentOrNumber;
        assert!(shape.accepts(&ParamValue::text("30%")));
        assert!(shape.accepts(&ParamValue::Float(12.5)));
        assert!(!shape.accepts(&ParamValue::text("fast")));
        assert!(!shape.accepts(&ParamValue::Bool(true)));
    }
}
