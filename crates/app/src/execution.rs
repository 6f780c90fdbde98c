//! Execution context of one rule instance, and what it reports when done.
//!
//! A context is resolved from a compiled rule and its triggering event: each
//! action's store is snapshotted and its event-field bindings are filled in
//! and validated. The context then belongs to exactly one instance; later
//! store writes do not affect it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use phonebot_domain::error::{ExecutionError, ValidationError};
use phonebot_domain::event::Event;
use phonebot_domain::id::{EventId, ExecutionId, RuleId};
use phonebot_domain::property::Value;
use phonebot_domain::time::Timestamp;

use crate::rule_engine::CompiledRule;

/// Cooperative cancellation handle handed to each running action.
///
/// Actions call [`check`](Self::check) between steps and use
/// [`sleep`](Self::sleep) for waits; both fail with
/// [`ExecutionError::Cancelled`] once the instance is cancelled or the
/// action's deadline passed.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    token: CancellationToken,
}

impl Checkpoint {
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// # Errors
    ///
    /// Returns [`ExecutionError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), ExecutionError> {
        if self.token.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Cancelled`] if cancellation arrives first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ExecutionError> {
        tokio::select! {
            () = self.token.cancelled() => Err(ExecutionError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Parameter values of one action, frozen for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    /// Store version the values were taken from.
    pub version: u64,
    pub values: BTreeMap<String, Value>,
}

/// Everything one rule instance runs with.
#[derive(Debug)]
pub struct ExecutionContext {
    instance: ExecutionId,
    rule_id: RuleId,
    event: Event,
    actions: Vec<ResolvedAction>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Snapshot every action's store and resolve its event-field bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a bound event field does not satisfy
    /// the property descriptor, or when a required property bound to an
    /// absent field has no other value.
    pub fn resolve(rule: &CompiledRule, event: Event) -> Result<Self, ValidationError> {
        let mut actions = Vec::with_capacity(rule.actions().len());
        for action in rule.actions() {
            let snapshot = action.store().snapshot();
            let mut values = snapshot.to_values();
            for (param, field) in action.bindings() {
                if let Some(raw) = event.field(field) {
                    let pv = action.store().validate_value(param, raw)?;
                    values.insert(param.clone(), pv.into_value());
                    continue;
                }
                let required = action
                    .store()
                    .descriptor(param)
                    .is_some_and(|d| d.is_required());
                if required && !values.contains_key(param) {
                    return Err(ValidationError::MissingProperty {
                        property: param.clone(),
                    });
                }
            }
            actions.push(ResolvedAction {
                version: snapshot.version(),
                values,
            });
        }

        Ok(Self {
            instance: ExecutionId::new(),
            rule_id: rule.id(),
            event,
            actions,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn instance(&self) -> ExecutionId {
        self.instance
    }

    #[must_use]
    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    #[must_use]
    pub fn action(&self, index: usize) -> Option<&ResolvedAction> {
        self.actions.get(index)
    }

    #[must_use]
    pub fn actions(&self) -> &[ResolvedAction] {
        &self.actions
    }

    /// Token cancelling the whole instance.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Lifecycle of a rule instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a single action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Completed,
    Failed,
    Cancelled,
    /// Never invoked because an earlier action did not complete.
    Skipped,
}

/// Outcome of one action within a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub index: usize,
    pub action_type: String,
    pub state: ActionState,
    /// Number of invocations, including retries.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub(crate) fn skipped(index: usize, action_type: &str) -> Self {
        Self {
            index,
            action_type: action_type.to_string(),
            state: ActionState::Skipped,
            attempts: 0,
            error: None,
        }
    }
}

/// Final record of a rule instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub instance: ExecutionId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub event_id: EventId,
    pub state: ExecutionState,
    pub actions: Vec<ActionOutcome>,
    /// `None` when the instance was cancelled before it started.
    pub started_at: Option<Timestamp>,
    pub finished_at: Timestamp,
}

impl ExecutionReport {
    /// The action that ended the instance early, if any.
    #[must_use]
    pub fn stopped_at(&self) -> Option<&ActionOutcome> {
        self.actions
            .iter()
            .find(|a| matches!(a.state, ActionState::Failed | ActionState::Cancelled))
    }
}

/// Render an error with its whole source chain, `outer: inner: root`.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
