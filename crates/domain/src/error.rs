//! Common error types used across the workspace.
//!
//! Each concern owns a typed error; [`PhoneBotError`] aggregates them via
//! `#[from]` so layers can propagate with `?`.

use std::time::Duration;

use crate::property::{PropertySubType, PropertyType};

/// Top-level error for the phonebot workspace.
#[derive(Debug, thiserror::Error)]
pub enum PhoneBotError {
    #[error("unknown property type")]
    UnknownType(#[from] UnknownTypeError),

    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("compile error")]
    Compile(#[from] CompileError),

    #[error("execution error")]
    Execution(#[from] ExecutionError),

    #[error("action timed out")]
    Timeout(#[from] TimeoutError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// An adapter-level persistence failure.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A `(type, subtype)` pair that the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no property type registered for {ty}/{subtype}")]
pub struct UnknownTypeError {
    pub ty: PropertyType,
    pub subtype: PropertySubType,
}

/// A value or definition that violates a domain invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("a rule needs at least one action")]
    NoActions,

    #[error("property `{property}` expects a {expected} value, got {found}")]
    TypeMismatch {
        property: String,
        expected: PropertyType,
        found: &'static str,
    },

    #[error("property `{property}` value {value} is outside the allowed range")]
    OutOfRange {
        property: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("property `{property}` must be a finite number")]
    NotFinite { property: String },

    #[error("property `{property}` value `{value}` is not one of the declared choices")]
    NotAChoice { property: String, value: String },

    #[error("property `{property}` must not be empty")]
    Empty { property: String },

    #[error("property `{property}` value `{value}` is not a valid time of day")]
    InvalidTime { property: String, value: String },

    #[error("unknown property `{property}`")]
    UnknownProperty { property: String },

    #[error("missing required property `{property}`")]
    MissingProperty { property: String },
}

/// A rule that could not be turned into its executable form.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rule `{rule}` failed to compile")]
pub struct CompileError {
    /// Name of the offending rule.
    pub rule: String,
    #[source]
    pub kind: CompileErrorKind,
}

/// What exactly went wrong while compiling a rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("invalid rule definition")]
    InvalidDefinition(#[source] ValidationError),

    #[error("action #{index} has unknown type `{action_type}`")]
    UnknownActionType { index: usize, action_type: String },

    #[error("action #{index} has unknown parameter `{parameter}`")]
    UnknownParameter { index: usize, parameter: String },

    #[error("action #{index} has an invalid parameter")]
    InvalidParameter {
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("action #{index} binds parameter `{parameter}` to an empty event field name")]
    EmptyBinding { index: usize, parameter: String },

    #[error("invalid trigger")]
    InvalidTrigger(#[source] TriggerError),
}

/// A trigger expression that cannot be compiled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerError {
    #[error("operator `{op}` cannot compare field `{field}` with a {literal} literal")]
    OperatorMismatch {
        field: String,
        op: &'static str,
        literal: &'static str,
    },

    #[error("literal for field `{field}` is invalid")]
    InvalidLiteral {
        field: String,
        #[source]
        source: ValidationError,
    },

    #[error("literal for field `{field}` has an unsupported shape")]
    UnsupportedLiteral { field: String },

    #[error("field name must not be empty")]
    EmptyField,
}

/// Failure of a single action while a rule instance runs.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The action observed its cancellation checkpoint.
    #[error("action cancelled")]
    Cancelled,

    #[error("no executor for action type `{action_type}`")]
    UnknownAction { action_type: String },

    #[error("invalid action parameter")]
    InvalidParameter(#[from] ValidationError),

    /// The side effect on the external system failed.
    #[error("action `{action_type}` failed")]
    Failed {
        action_type: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExecutionError {
    /// Wrap an arbitrary side-effect failure.
    pub fn failed(
        action_type: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Failed {
            action_type: action_type.into(),
            source: source.into(),
        }
    }

    /// Whether this error is the cooperative cancellation signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// An action ran past its deadline; it surfaces as `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("action `{action_type}` exceeded its {after:?} deadline")]
pub struct TimeoutError {
    pub action_type: String,
    pub after: Duration,
}

/// A lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
