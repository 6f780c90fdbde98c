//! Rule: trigger → ordered actions.
//!
//! A [`RuleDefinition`] is the raw, persisted form written by a user or a
//! rule file. It is compiled by the application layer into an executable
//! rule; the trigger part of that is [`CompiledTrigger`].

mod action;
mod trigger;

pub use action::{ActionDefinition, ParamSource};
pub use trigger::{CompareOp, CompiledTrigger, TriggerExpr, Truth};

use serde::{Deserialize, Serialize};

use crate::error::{PhoneBotError, ValidationError};
use crate::id::RuleId;

/// What to do with a new trigger of an exclusive rule while an instance
/// is still pending or running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Run it after the current instance finishes.
    #[default]
    Queue,
    /// Discard it.
    Drop,
}

/// A user-defined automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub id: RuleId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Only one instance may be pending or running at a time.
    #[serde(default)]
    pub exclusive: bool,
    /// Overrides the scheduler's policy for this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<ConflictPolicy>,
    pub trigger: TriggerExpr,
    pub actions: Vec<ActionDefinition>,
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    /// Create a builder for constructing a [`RuleDefinition`].
    #[must_use]
    pub fn builder() -> RuleDefinitionBuilder {
        RuleDefinitionBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    pub fn validate(&self) -> Result<(), PhoneBotError> {
        self.check_invariants().map_err(PhoneBotError::from)
    }

    /// Same as [`validate`](Self::validate), returning the bare validation error.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions);
        }
        Ok(())
    }
}

/// Step-by-step builder for [`RuleDefinition`].
#[derive(Debug, Default)]
pub struct RuleDefinitionBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    enabled: Option<bool>,
    exclusive: bool,
    on_conflict: Option<ConflictPolicy>,
    trigger: Option<TriggerExpr>,
    actions: Vec<ActionDefinition>,
}

impl RuleDefinitionBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = Some(policy);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: TriggerExpr) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder, validate, and return a [`RuleDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<RuleDefinition, PhoneBotError> {
        let rule = RuleDefinition {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            exclusive: self.exclusive,
            on_conflict: self.on_conflict,
            trigger: self.trigger.unwrap_or(TriggerExpr::Always),
            actions: self.actions,
        };
        rule.validate()?;
        Ok(rule)
    }
}
