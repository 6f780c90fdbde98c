//! Action executor port: performs the side effect of one action.

use std::collections::BTreeMap;
use std::future::Future;

use phonebot_domain::error::{ExecutionError, ValidationError};
use phonebot_domain::event::Event;
use phonebot_domain::id::{ExecutionId, RuleId};
use phonebot_domain::property::Value;

use crate::execution::Checkpoint;

/// Everything an executor needs to perform one action.
#[derive(Debug, Clone, Copy)]
pub struct ActionCall<'a> {
    pub rule_id: RuleId,
    pub instance: ExecutionId,
    /// Position of the action within its rule.
    pub index: usize,
    pub action_type: &'a str,
    /// Validated property values, snapshot plus resolved bindings.
    pub properties: &'a BTreeMap<String, Value>,
    /// The event that triggered the rule.
    pub event: &'a Event,
}

impl ActionCall<'_> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Look up a property that the action cannot run without.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidParameter`] when the property is unset.
    pub fn require(&self, name: &str) -> Result<&Value, ExecutionError> {
        self.get(name).ok_or_else(|| {
            ValidationError::MissingProperty {
                property: name.to_string(),
            }
            .into()
        })
    }
}

/// Performs actions on behalf of the scheduler.
///
/// Implementations must poll `checkpoint` during long-running work; the
/// scheduler never aborts an action on its own.
pub trait ActionExecutor: Send + Sync + 'static {
    /// Perform one action.
    fn execute(
        &self,
        call: ActionCall<'_>,
        checkpoint: Checkpoint,
    ) -> impl Future<Output = Result<(), ExecutionError>> + Send;
}

impl<T: ActionExecutor> ActionExecutor for std::sync::Arc<T> {
    fn execute(
        &self,
        call: ActionCall<'_>,
        checkpoint: Checkpoint,
    ) -> impl Future<Output = Result<(), ExecutionError>> + Send {
        (**self).execute(call, checkpoint)
    }
}
