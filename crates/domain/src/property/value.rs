//! Normalised property values.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::PropertyDescriptor;
use crate::time::{TimeOfDay, parse_time_of_day};

/// A raw value after normalisation against its [`PropertyType`](super::PropertyType).
///
/// Serialises untagged; `Time` is written as `HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    Time(TimeOfDay),
    String(String),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Time(_) => "time",
            Self::String(_) => "string",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Double` values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Time view; strings holding `HH:MM[:SS]` are accepted too.
    #[must_use]
    pub fn as_time(&self) -> Option<TimeOfDay> {
        match self {
            Self::Time(t) => Some(*t),
            Self::String(s) => parse_time_of_day(s),
            _ => None,
        }
    }

    /// Convert back to raw JSON, e.g. to re-validate against another descriptor.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::Time(t) => serde_json::Value::String(t.format("%H:%M:%S").to_string()),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Order two values of compatible kinds.
    ///
    /// `Int` and `Double` compare numerically, `Time` compares with a
    /// time-shaped string. Incompatible kinds yield `None`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Time(_), _) | (_, Self::Time(_)) => {
                let (a, b) = (self.as_time()?, other.as_time()?);
                Some(a.cmp(&b))
            }
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M")),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Short name of a raw JSON value's shape.
#[must_use]
pub fn json_kind(raw: &serde_json::Value) -> &'static str {
    match raw {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A validated value bound to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    descriptor: Arc<PropertyDescriptor>,
    value: Value,
}

impl PropertyValue {
    pub(crate) fn new(descriptor: Arc<PropertyDescriptor>, value: Value) -> Self {
        Self { descriptor, value }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<PropertyDescriptor> {
        &self.descriptor
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}
