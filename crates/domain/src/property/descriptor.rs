//! Property descriptors: the immutable schema of a single parameter.

use serde::Serialize;

use super::{PropertySubType, PropertyType, Value};

/// One entry of a `Choice` property: a display label and the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

/// Additional restrictions on the values a property accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraints {
    /// Inclusive lower bound for `Int` / `Double` properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for `Int` / `Double` properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Allowed values for `Choice` properties.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Reject blank strings.
    pub non_empty: bool,
}

impl Constraints {
    /// Whether `value` is one of the declared choice values.
    #[must_use]
    pub fn allows_choice(&self, value: &str) -> bool {
        self.choices.iter().any(|c| c.value == value)
    }
}

/// Schema of a single named, typed property.
///
/// Descriptors are only created through
/// [`TypeRegistry::describe`](crate::registry::TypeRegistry::describe), which
/// guarantees that the `(type, subtype)` pair is registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    name: String,
    description: String,
    #[serde(rename = "type")]
    ty: PropertyType,
    subtype: PropertySubType,
    constraints: Constraints,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl PropertyDescriptor {
    pub(crate) fn new(name: String, ty: PropertyType, subtype: PropertySubType) -> Self {
        Self {
            name,
            description: String::new(),
            ty,
            subtype,
            constraints: Constraints::default(),
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    #[must_use]
    pub fn subtype(&self) -> PropertySubType {
        self.subtype
    }

    #[must_use]
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Restrict numeric values to `min..=max`.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints.min = Some(min);
        self.constraints.max = Some(max);
        self
    }

    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    #[must_use]
    pub fn with_choice(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.choices.push(Choice {
            label: label.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn non_empty(mut self) -> Self {
        self.constraints.non_empty = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when a rule does not set this property.
    ///
    /// The default is not validated here; schema authors are expected to
    /// pass a value that satisfies the descriptor.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}
