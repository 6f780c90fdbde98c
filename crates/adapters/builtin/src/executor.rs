//! Executor for the built-in actions.

use std::future::Future;
use std::time::Duration;

use phonebot_app::execution::Checkpoint;
use phonebot_app::ports::{ActionCall, ActionExecutor, EventPublisher};
use phonebot_domain::error::{ExecutionError, ValidationError};
use phonebot_domain::event::{Event, INTENT_PREFIX};
use phonebot_domain::property::Value;

/// Actions whose side effect belongs to the platform layer.
const PLATFORM_ACTIONS: [&str; 6] = [
    "launch_application",
    "open_url",
    "set_profile",
    "notify",
    "wlan_switch",
    "data_switch",
];

/// Performs the built-in actions; platform actions become `intent.*` events
/// on `publisher`.
pub struct BuiltinExecutor<P> {
    publisher: P,
}

impl<P> BuiltinExecutor<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }
}

impl<P> ActionExecutor for BuiltinExecutor<P>
where
    P: EventPublisher + Send + Sync + 'static,
{
    fn execute(
        &self,
        call: ActionCall<'_>,
        checkpoint: Checkpoint,
    ) -> impl Future<Output = Result<(), ExecutionError>> + Send {
        async move {
            checkpoint.check()?;
            match call.action_type {
                "log" => log(&call),
                "delay" => {
                    let seconds = call.require("seconds")?.as_f64().unwrap_or_default();
                    let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
                        ValidationError::NotFinite {
                            property: "seconds".to_string(),
                        }
                    })?;
                    checkpoint.sleep(duration).await
                }
                action if PLATFORM_ACTIONS.contains(&action) => {
                    let event = intent(&call);
                    tracing::debug!(kind = %event.kind, rule_id = %call.rule_id, "publishing intent");
                    self.publisher
                        .publish(event)
                        .await
                        .map_err(|err| ExecutionError::failed(action, err))
                }
                other => Err(ExecutionError::UnknownAction {
                    action_type: other.to_string(),
                }),
            }
        }
    }
}

fn log(call: &ActionCall<'_>) -> Result<(), ExecutionError> {
    let message = call.require("message")?.to_string();
    let level = call.get("level").and_then(Value::as_str).unwrap_or("info");
    let rule_id = call.rule_id;
    match level {
        "debug" => tracing::debug!(%rule_id, "{message}"),
        "warn" => tracing::warn!(%rule_id, "{message}"),
        "error" => tracing::error!(%rule_id, "{message}"),
        _ => tracing::info!(%rule_id, "{message}"),
    }
    Ok(())
}

fn intent(call: &ActionCall<'_>) -> Event {
    let mut event = Event::new(format!("{INTENT_PREFIX}{}", call.action_type));
    event.fields = call.properties.clone();
    event
}
