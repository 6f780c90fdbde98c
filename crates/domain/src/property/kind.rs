//! Property type and subtype classification.

use serde::{Deserialize, Serialize};

/// Data shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Int,
    Double,
    Bool,
    Time,
}

/// Specialised editing behaviour layered on top of a [`PropertyType`].
///
/// `Choice` and `Application` only make sense for `String` properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertySubType {
    #[default]
    None,
    /// The value must be one of a declared list of choices.
    Choice,
    /// The value identifies an installed application.
    Application,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Double => f.write_str("double"),
            Self::Bool => f.write_str("bool"),
            Self::Time => f.write_str("time"),
        }
    }
}

impl std::fmt::Display for PropertySubType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Choice => f.write_str("choice"),
            Self::Application => f.write_str("application"),
        }
    }
}
