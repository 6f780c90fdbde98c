//! Dispatcher: the single path from events to rule instances.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use phonebot_domain::event::Event;

use crate::execution::ExecutionContext;
use crate::ports::ActionExecutor;
use crate::rule_engine::RuleEngine;
use crate::scheduler::{ExecutionScheduler, Submission};

/// Evaluates each event against the active rules and submits every match.
pub struct Dispatcher<E> {
    engine: Arc<RuleEngine>,
    scheduler: ExecutionScheduler<E>,
}

impl<E: ActionExecutor> Dispatcher<E> {
    #[must_use]
    pub fn new(engine: Arc<RuleEngine>, scheduler: ExecutionScheduler<E>) -> Self {
        Self { engine, scheduler }
    }

    #[must_use]
    pub fn scheduler(&self) -> &ExecutionScheduler<E> {
        &self.scheduler
    }

    /// Submit one instance per matching rule. Does not wait for them to run.
    ///
    /// A rule whose bindings cannot be resolved against `event` is skipped.
    /// Intent events are addressed to the platform layer and never trigger
    /// rules.
    pub fn dispatch(&self, event: &Event) -> Vec<Submission> {
        if event.is_intent() {
            tracing::trace!(kind = %event.kind, "ignoring intent event");
            return Vec::new();
        }
        let matched = self.engine.evaluate(event);
        let mut submissions = Vec::with_capacity(matched.len());
        for rule in matched {
            let ctx = match ExecutionContext::resolve(&rule, event.clone()) {
                Ok(ctx) => ctx,
                Err(err) => {
                    tracing::warn!(
                        rule = %rule.name(),
                        kind = %event.kind,
                        error = %err,
                        "cannot bind event to rule, skipping"
                    );
                    continue;
                }
            };
            tracing::debug!(rule = %rule.name(), instance = %ctx.instance(), "submitting rule instance");
            submissions.push(self.scheduler.submit(rule, ctx));
        }
        submissions
    }

    /// Drain `events` until `shutdown` is cancelled or the bus closes.
    pub async fn run(&self, mut events: broadcast::Receiver<Event>, shutdown: CancellationToken) {
        tracing::info!("dispatcher started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        self.dispatch(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "dispatcher lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("dispatcher stopped");
    }
}
