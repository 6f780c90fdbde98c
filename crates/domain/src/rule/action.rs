//! Action: a configured side effect performed when a rule fires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where an action parameter gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSource {
    /// Copy a field of the triggering event, validated when the rule fires.
    EventField { event_field: String },
    /// A raw value, type-checked when the rule is compiled.
    Literal(serde_json::Value),
}

impl From<serde_json::Value> for ParamSource {
    fn from(value: serde_json::Value) -> Self {
        Self::Literal(value)
    }
}

/// One step of a rule: an action type and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Catalog key, e.g. `"open_url"`.
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSource>,
    /// Deadline for this action; the scheduler default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ActionDefinition {
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
            timeout_ms: None,
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, source: impl Into<ParamSource>) -> Self {
        self.params.insert(name.into(), source.into());
        self
    }

    /// Fill `name` from the triggering event's `field`.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.params.insert(
            name.into(),
            ParamSource::EventField {
                event_field: field.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl std::fmt::Display for ActionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.action_type)?;
        for (i, name) in self.params.keys().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}
