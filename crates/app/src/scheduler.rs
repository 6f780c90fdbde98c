//! Execution scheduler: runs rule instances as tokio tasks.
//!
//! Each submitted instance gets its own task; its actions run strictly in
//! declared order and the first action that does not complete ends the
//! instance. Exclusive rules keep at most one instance pending or running,
//! later submissions are queued or dropped. An action that panics fails
//! its instance like any other error.
//!
//! Deadlines and cancellation are cooperative: an expired deadline only
//! cancels the action's [`Checkpoint`], the action keeps running until it
//! observes it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use phonebot_domain::error::{ExecutionError, TimeoutError};
use phonebot_domain::id::{ExecutionId, RuleId};
use phonebot_domain::rule::ConflictPolicy;
use phonebot_domain::time::{Timestamp, now};

use crate::execution::{
    ActionOutcome, ActionState, Checkpoint, ExecutionContext, ExecutionReport, ExecutionState,
    error_chain,
};
use crate::ports::{ActionCall, ActionExecutor};
use crate::rule_engine::{CompiledAction, CompiledRule};

/// Scheduler-wide settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Deadline for actions that do not declare their own.
    pub default_action_timeout: Option<Duration>,
    /// Conflict policy for exclusive rules without their own.
    pub exclusive_policy: ConflictPolicy,
    /// Buffered reports per subscriber.
    pub report_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_action_timeout: Some(Duration::from_secs(30)),
            exclusive_policy: ConflictPolicy::Queue,
            report_capacity: 64,
        }
    }
}

/// Whether a failed action is tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    None,
    /// Up to `attempts` invocations in total, `backoff` apart.
    Fixed { attempts: u32, backoff: Duration },
}

impl RetryPolicy {
    fn max_attempts(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { attempts, .. } => attempts.max(1),
        }
    }

    fn backoff(self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { backoff, .. } => backoff,
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    pub retry: RetryPolicy,
}

/// What happened to a submitted instance.
#[derive(Debug)]
pub enum Submission {
    Started(ExecutionHandle),
    /// Waiting behind a running instance of the same exclusive rule.
    Queued(ExecutionHandle),
    /// Discarded by the exclusive rule's conflict policy.
    Dropped,
}

impl Submission {
    #[must_use]
    pub fn handle(self) -> Option<ExecutionHandle> {
        match self {
            Self::Started(handle) | Self::Queued(handle) => Some(handle),
            Self::Dropped => None,
        }
    }

    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }
}

/// Observes and controls one submitted instance.
#[derive(Debug)]
pub struct ExecutionHandle {
    instance: ExecutionId,
    rule_id: RuleId,
    state: watch::Receiver<ExecutionState>,
    report: oneshot::Receiver<ExecutionReport>,
    cancel: CancellationToken,
}

impl ExecutionHandle {
    #[must_use]
    pub fn instance(&self) -> ExecutionId {
        self.instance
    }

    #[must_use]
    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    #[must_use]
    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    /// Request cancellation. Takes effect at the running action's next
    /// checkpoint, or before the first action if the instance is queued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final report. `None` if the instance's task was lost.
    pub async fn wait(self) -> Option<ExecutionReport> {
        self.report.await.ok()
    }
}

struct Job {
    rule: Arc<CompiledRule>,
    ctx: ExecutionContext,
    options: SubmitOptions,
    state: watch::Sender<ExecutionState>,
    report: oneshot::Sender<ExecutionReport>,
}

enum Attempt {
    Completed,
    Cancelled { timed_out: Option<Duration> },
    Failed(ExecutionError),
}

struct Shared<E> {
    executor: E,
    config: SchedulerConfig,
    reports: broadcast::Sender<ExecutionReport>,
    /// Exclusive rules with an instance pending or running, and their queue.
    exclusive: Mutex<HashMap<RuleId, VecDeque<Job>>>,
    /// Cancellation tokens of every instance not yet finished.
    active: Mutex<HashMap<ExecutionId, CancellationToken>>,
    tracker: TaskTracker,
}

/// Runs rule instances on the tokio runtime.
pub struct ExecutionScheduler<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for ExecutionScheduler<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: ActionExecutor> ExecutionScheduler<E> {
    #[must_use]
    pub fn new(executor: E, config: SchedulerConfig) -> Self {
        let (reports, _) = broadcast::channel(config.report_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                executor,
                config,
                reports,
                exclusive: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Receive the report of every instance that finishes from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionReport> {
        self.shared.reports.subscribe()
    }

    /// Submit with default options. Must be called within a tokio runtime.
    pub fn submit(&self, rule: Arc<CompiledRule>, ctx: ExecutionContext) -> Submission {
        self.submit_with(rule, ctx, SubmitOptions::default())
    }

    /// Submit an instance of `rule`. Returns without waiting for it to run.
    pub fn submit_with(
        &self,
        rule: Arc<CompiledRule>,
        ctx: ExecutionContext,
        options: SubmitOptions,
    ) -> Submission {
        if self.shared.tracker.is_closed() {
            tracing::warn!(rule = %rule.name(), "scheduler is shut down, dropping instance");
            return Submission::Dropped;
        }

        let (state_tx, state_rx) = watch::channel(ExecutionState::Pending);
        let (report_tx, report_rx) = oneshot::channel();
        let handle = ExecutionHandle {
            instance: ctx.instance(),
            rule_id: rule.id(),
            state: state_rx,
            report: report_rx,
            cancel: ctx.cancel_token().clone(),
        };
        let job = Job {
            rule,
            ctx,
            options,
            state: state_tx,
            report: report_tx,
        };

        if !job.rule.is_exclusive() {
            self.track(&job);
            self.spawn(job);
            return Submission::Started(handle);
        }

        let rule_id = job.rule.id();
        let policy = job
            .rule
            .on_conflict()
            .unwrap_or(self.shared.config.exclusive_policy);
        {
            let mut slots = self
                .shared
                .exclusive
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(queue) = slots.get_mut(&rule_id) {
                return match policy {
                    ConflictPolicy::Drop => {
                        tracing::debug!(rule = %job.rule.name(), "exclusive rule busy, dropping instance");
                        Submission::Dropped
                    }
                    ConflictPolicy::Queue => {
                        tracing::debug!(
                            rule = %job.rule.name(),
                            queued = queue.len() + 1,
                            "exclusive rule busy, queueing instance"
                        );
                        self.track(&job);
                        queue.push_back(job);
                        Submission::Queued(handle)
                    }
                };
            }
            slots.insert(rule_id, VecDeque::new());
        }

        self.track(&job);
        self.spawn_exclusive(job);
        Submission::Started(handle)
    }

    /// Cancel one instance. Returns `false` if it already finished.
    pub fn cancel(&self, instance: ExecutionId) -> bool {
        let active = self
            .shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match active.get(&instance) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending and running instance.
    pub fn cancel_all(&self) {
        let active = self
            .shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for token in active.values() {
            token.cancel();
        }
    }

    /// Instances submitted but not yet finished.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel everything, refuse new submissions and wait for all tasks
    /// to finish.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        tracing::info!("scheduler stopped");
    }

    fn track(&self, job: &Job) {
        self.shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.ctx.instance(), job.ctx.cancel_token().clone());
    }

    fn spawn(&self, job: Job) {
        let shared = Arc::clone(&self.shared);
        self.shared.tracker.spawn(async move {
            let (result, report) = shared.run(job).await;
            shared.publish(result, report);
        });
    }

    fn spawn_exclusive(&self, job: Job) {
        let shared = Arc::clone(&self.shared);
        self.shared.tracker.spawn(async move {
            let rule_id = job.rule.id();
            let mut next = Some(job);
            while let Some(job) = next {
                let (result, report) = shared.run(job).await;
                next = shared.next_queued(rule_id);
                shared.publish(result, report);
            }
        });
    }
}

impl<E: ActionExecutor> Shared<E> {
    /// Pop the next queued instance, or release the rule's slot.
    fn next_queued(&self, rule_id: RuleId) -> Option<Job> {
        let mut slots = self.exclusive.lock().unwrap_or_else(PoisonError::into_inner);
        let next = slots.get_mut(&rule_id).and_then(VecDeque::pop_front);
        if next.is_none() {
            slots.remove(&rule_id);
        }
        next
    }

    async fn run(
        self: &Arc<Self>,
        job: Job,
    ) -> (ExecutionReport, oneshot::Sender<ExecutionReport>) {
        let Job {
            rule,
            ctx,
            options,
            state,
            report,
        } = job;
        let ctx = Arc::new(ctx);

        let result = self.execute(&rule, &ctx, options, &state).await;
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ctx.instance());

        match result.state {
            ExecutionState::Completed => tracing::info!(
                rule = %result.rule_name,
                instance = %result.instance,
                "rule instance completed"
            ),
            ExecutionState::Cancelled => tracing::info!(
                rule = %result.rule_name,
                instance = %result.instance,
                "rule instance cancelled"
            ),
            _ => tracing::warn!(
                rule = %result.rule_name,
                instance = %result.instance,
                error = result.stopped_at().and_then(|a| a.error.as_deref()),
                "rule instance failed"
            ),
        }

        (result, report)
    }

    fn publish(&self, result: ExecutionReport, report: oneshot::Sender<ExecutionReport>) {
        let _ = self.reports.send(result.clone());
        let _ = report.send(result);
    }

    async fn execute(
        self: &Arc<Self>,
        rule: &CompiledRule,
        ctx: &Arc<ExecutionContext>,
        options: SubmitOptions,
        state: &watch::Sender<ExecutionState>,
    ) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(rule.actions().len());

        if ctx.is_cancelled() {
            outcomes.extend(
                rule.actions()
                    .iter()
                    .enumerate()
                    .map(|(i, a)| ActionOutcome::skipped(i, a.action_type())),
            );
            state.send_replace(ExecutionState::Cancelled);
            return build_report(rule, ctx, ExecutionState::Cancelled, outcomes, None);
        }

        let started_at = now();
        state.send_replace(ExecutionState::Running);
        tracing::debug!(rule = %rule.name(), instance = %ctx.instance(), "rule instance started");

        let mut final_state = ExecutionState::Completed;
        for (index, action) in rule.actions().iter().enumerate() {
            if final_state == ExecutionState::Completed && ctx.is_cancelled() {
                final_state = ExecutionState::Cancelled;
            }
            if final_state != ExecutionState::Completed {
                outcomes.push(ActionOutcome::skipped(index, action.action_type()));
                continue;
            }
            let outcome = self.run_action(rule, ctx, index, action, options).await;
            final_state = match outcome.state {
                ActionState::Failed => ExecutionState::Failed,
                ActionState::Cancelled => ExecutionState::Cancelled,
                ActionState::Completed | ActionState::Skipped => ExecutionState::Completed,
            };
            outcomes.push(outcome);
        }

        state.send_replace(final_state);
        build_report(rule, ctx, final_state, outcomes, Some(started_at))
    }

    async fn run_action(
        self: &Arc<Self>,
        rule: &CompiledRule,
        ctx: &Arc<ExecutionContext>,
        index: usize,
        action: &CompiledAction,
        options: SubmitOptions,
    ) -> ActionOutcome {
        let timeout = action.timeout().or(self.config.default_action_timeout);
        let max_attempts = options.retry.max_attempts();

        let outcome = |state, attempts, error| ActionOutcome {
            index,
            action_type: action.action_type().to_string(),
            state,
            attempts,
            error,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(rule.id(), ctx, index, action, timeout).await {
                Attempt::Completed => return outcome(ActionState::Completed, attempts, None),
                Attempt::Cancelled { timed_out } => {
                    let error = timed_out.map(|after| {
                        TimeoutError {
                            action_type: action.action_type().to_string(),
                            after,
                        }
                        .to_string()
                    });
                    return outcome(ActionState::Cancelled, attempts, error);
                }
                Attempt::Failed(err) => {
                    if attempts >= max_attempts || ctx.is_cancelled() {
                        return outcome(ActionState::Failed, attempts, Some(error_chain(&err)));
                    }
                    tracing::warn!(
                        rule = %rule.name(),
                        action = action.action_type(),
                        attempt = attempts,
                        error = %err,
                        "action failed, retrying"
                    );
                    let backoff = Checkpoint::new(ctx.cancel_token().clone());
                    if backoff.sleep(options.retry.backoff()).await.is_err() {
                        return outcome(ActionState::Cancelled, attempts, None);
                    }
                }
            }
        }
    }

    /// One invocation of the executor, in its own task so that a panicking
    /// action fails only itself.
    async fn attempt(
        self: &Arc<Self>,
        rule_id: RuleId,
        ctx: &Arc<ExecutionContext>,
        index: usize,
        action: &CompiledAction,
        timeout: Option<Duration>,
    ) -> Attempt {
        let token = ctx.cancel_token().child_token();
        let mut task = self.tracker.spawn({
            let shared = Arc::clone(self);
            let ctx = Arc::clone(ctx);
            let action_type = action.action_type().to_string();
            let checkpoint = Checkpoint::new(token.clone());
            async move {
                let empty = BTreeMap::new();
                let call = ActionCall {
                    rule_id,
                    instance: ctx.instance(),
                    index,
                    action_type: &action_type,
                    properties: ctx.action(index).map_or(&empty, |a| &a.values),
                    event: ctx.event(),
                };
                shared.executor.execute(call, checkpoint).await
            }
        });

        let mut timed_out = None;
        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::debug!(action = action.action_type(), ?limit, "action deadline passed");
                    timed_out = Some(limit);
                    token.cancel();
                    task.await
                }
            },
            None => task.await,
        };
        let result = joined.unwrap_or_else(|err| {
            tracing::error!(action = action.action_type(), error = %err, "action task aborted");
            Err(ExecutionError::failed(action.action_type(), err))
        });
        match result {
            Ok(()) => Attempt::Completed,
            Err(err) if err.is_cancelled() => Attempt::Cancelled { timed_out },
            Err(err) => Attempt::Failed(err),
        }
    }
}

fn build_report(
    rule: &CompiledRule,
    ctx: &ExecutionContext,
    state: ExecutionState,
    actions: Vec<ActionOutcome>,
    started_at: Option<Timestamp>,
) -> ExecutionReport {
    ExecutionReport {
        instance: ctx.instance(),
        rule_id: rule.id(),
        rule_name: rule.name().to_string(),
        event_id: ctx.event().id,
        state,
        actions,
        started_at,
        finished_at: now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use phonebot_domain::event::Event;
    use phonebot_domain::property::Value;
    use phonebot_domain::rule::{ActionDefinition, RuleDefinition};
    use serde_json::json;

    use crate::rule_engine::RuleEngine;
    use crate::rule_engine::tests::test_catalog;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        flaky: AtomicU32,
    }

    impl Recorder {
        fn record(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ActionExecutor for Recorder {
        fn execute(
            &self,
            call: ActionCall<'_>,
            checkpoint: Checkpoint,
        ) -> impl Future<Output = Result<(), ExecutionError>> + Send {
            async move {
                match call.action_type {
                    "step" => {
                        let label = call.get("label").map(ToString::to_string).unwrap_or_default();
                        self.record(label);
                        Ok(())
                    }
                    "fail" => {
                        self.record("fail".to_string());
                        Err(ExecutionError::failed("fail", "boom"))
                    }
                    "delay" => {
                        let seconds = call.get("seconds").and_then(Value::as_f64).unwrap_or(0.0);
                        checkpoint.sleep(Duration::from_secs_f64(seconds)).await?;
                        self.record("delay".to_string());
                        Ok(())
                    }
                    "stubborn" => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        checkpoint.check()?;
                        self.record("stubborn".to_string());
                        Ok(())
                    }
                    "flaky" => {
                        if self.flaky.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(ExecutionError::failed("flaky", "not yet"))
                        } else {
                            self.record("flaky".to_string());
                            Ok(())
                        }
                    }
                    other => Err(ExecutionError::UnknownAction {
                        action_type: other.to_string(),
                    }),
                }
            }
        }
    }

    fn scheduler(config: SchedulerConfig) -> (ExecutionScheduler<Arc<Recorder>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (ExecutionScheduler::new(Arc::clone(&recorder), config), recorder)
    }

    fn compile(def: &RuleDefinition) -> Arc<CompiledRule> {
        Arc::new(
            RuleEngine::new(Arc::new(test_catalog()))
                .compile(def)
                .unwrap(),
        )
    }

    fn step(label: &str) -> ActionDefinition {
        ActionDefinition::new("step").param("label", json!(label))
    }

    fn delay(seconds: f64) -> ActionDefinition {
        ActionDefinition::new("delay").param("seconds", json!(seconds))
    }

    fn ctx(rule: &CompiledRule) -> ExecutionContext {
        ExecutionContext::resolve(rule, Event::new("test")).unwrap()
    }

    fn exclusive_rule(policy: ConflictPolicy, seconds: f64) -> Arc<CompiledRule> {
        compile(
            &RuleDefinition::builder()
                .name("exclusive")
                .exclusive(true)
                .on_conflict(policy)
                .action(delay(seconds))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn should_run_actions_in_declared_order() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("ordered")
                .action(step("a"))
                .action(step("b"))
                .action(step("c"))
                .build()
                .unwrap(),
        );

        let handle = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        let report = handle.wait().await.unwrap();

        assert_eq!(report.state, ExecutionState::Completed);
        assert_eq!(recorder.calls(), vec!["a", "b", "c"]);
        assert!(report.actions.iter().all(|a| a.state == ActionState::Completed));
        assert!(report.started_at.is_some());
    }

    #[tokio::test]
    async fn should_skip_remaining_actions_after_failure() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("breaks")
                .action(step("a"))
                .action(ActionDefinition::new("fail"))
                .action(step("c"))
                .build()
                .unwrap(),
        );

        let report = scheduler
            .submit(Arc::clone(&rule), ctx(&rule))
            .handle()
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.state, ExecutionState::Failed);
        assert_eq!(recorder.calls(), vec!["a", "fail"]);
        let states: Vec<_> = report.actions.iter().map(|a| a.state).collect();
        assert_eq!(
            states,
            vec![ActionState::Completed, ActionState::Failed, ActionState::Skipped]
        );
        let stopped = report.stopped_at().unwrap();
        assert_eq!(stopped.index, 1);
        assert!(stopped.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn should_complete_independent_instances() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("parallel")
                .action(delay(0.05))
                .build()
                .unwrap(),
        );

        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        let second = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(matches!(first, Submission::Started(_)));
        assert!(matches!(second, Submission::Started(_)));

        let a = first.handle().unwrap().wait().await.unwrap();
        let b = second.handle().unwrap().wait().await.unwrap();
        assert_ne!(a.instance, b.instance);
        assert_eq!(a.state, ExecutionState::Completed);
        assert_eq!(b.state, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn should_report_timed_out_action_as_cancelled() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("slow")
                .action(ActionDefinition::new("stubborn").timeout_ms(20))
                .action(step("after"))
                .build()
                .unwrap(),
        );

        let report = scheduler
            .submit(Arc::clone(&rule), ctx(&rule))
            .handle()
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.state, ExecutionState::Cancelled);
        assert_eq!(report.actions[0].state, ActionState::Cancelled);
        assert!(report.actions[0].error.as_deref().unwrap().contains("deadline"));
        assert_eq!(report.actions[1].state, ActionState::Skipped);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn should_apply_default_timeout() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            default_action_timeout: Some(Duration::from_millis(20)),
            ..SchedulerConfig::default()
        });
        let rule = compile(
            &RuleDefinition::builder()
                .name("slow")
                .action(ActionDefinition::new("stubborn"))
                .build()
                .unwrap(),
        );
        let report = scheduler
            .submit(Arc::clone(&rule), ctx(&rule))
            .handle()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(report.state, ExecutionState::Cancelled);
    }

    #[tokio::test]
    async fn should_drop_busy_exclusive_rule_with_drop_policy() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let rule = exclusive_rule(ConflictPolicy::Drop, 0.1);

        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        let second = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(matches!(first, Submission::Started(_)));
        assert!(second.is_dropped());

        let report = first.handle().unwrap().wait().await.unwrap();
        assert_eq!(report.state, ExecutionState::Completed);

        let third = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(matches!(third, Submission::Started(_)));
    }

    #[tokio::test]
    async fn should_queue_busy_exclusive_rule_with_queue_policy() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = exclusive_rule(ConflictPolicy::Queue, 0.05);

        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        let second = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(matches!(first, Submission::Started(_)));
        let Submission::Queued(second) = second else {
            panic!("expected the second instance to be queued");
        };
        assert_eq!(second.state(), ExecutionState::Pending);

        let a = first.handle().unwrap().wait().await.unwrap();
        let b = second.wait().await.unwrap();
        assert_eq!(a.state, ExecutionState::Completed);
        assert_eq!(b.state, ExecutionState::Completed);
        assert!(a.finished_at <= b.started_at.unwrap());
        assert_eq!(recorder.calls(), vec!["delay", "delay"]);
    }

    #[tokio::test]
    async fn should_use_scheduler_policy_when_rule_has_none() {
        let (scheduler, _) = scheduler(SchedulerConfig {
            exclusive_policy: ConflictPolicy::Drop,
            ..SchedulerConfig::default()
        });
        let rule = compile(
            &RuleDefinition::builder()
                .name("exclusive")
                .exclusive(true)
                .action(delay(0.05))
                .build()
                .unwrap(),
        );
        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(scheduler.submit(Arc::clone(&rule), ctx(&rule)).is_dropped());
        first.handle().unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn should_cancel_running_instance() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("long")
                .action(delay(60.0))
                .action(step("never"))
                .build()
                .unwrap(),
        );
        let handle = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), ExecutionState::Running);

        handle.cancel();
        let report = handle.wait().await.unwrap();
        assert_eq!(report.state, ExecutionState::Cancelled);
        assert!(report.actions[0].error.is_none());
        assert!(recorder.calls().is_empty());
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn should_cancel_queued_instance_before_it_starts() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = exclusive_rule(ConflictPolicy::Queue, 0.05);

        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        let second = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        assert!(scheduler.cancel(second.instance()));

        let b = second.wait().await.unwrap();
        assert_eq!(b.state, ExecutionState::Cancelled);
        assert!(b.started_at.is_none());
        assert_eq!(b.actions[0].state, ActionState::Skipped);

        first.wait().await.unwrap();
        assert_eq!(recorder.calls(), vec!["delay"]);
    }

    #[tokio::test]
    async fn should_retry_failed_action_when_requested() {
        let (scheduler, recorder) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("flaky")
                .action(ActionDefinition::new("flaky"))
                .build()
                .unwrap(),
        );
        let options = SubmitOptions {
            retry: RetryPolicy::Fixed {
                attempts: 3,
                backoff: Duration::from_millis(1),
            },
        };
        let report = scheduler
            .submit_with(Arc::clone(&rule), ctx(&rule), options)
            .handle()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(report.state, ExecutionState::Completed);
        assert_eq!(report.actions[0].attempts, 3);
        assert_eq!(recorder.calls(), vec!["flaky"]);
    }

    #[tokio::test]
    async fn should_not_retry_by_default() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("flaky")
                .action(ActionDefinition::new("flaky"))
                .build()
                .unwrap(),
        );
        let report = scheduler
            .submit(Arc::clone(&rule), ctx(&rule))
            .handle()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(report.state, ExecutionState::Failed);
        assert_eq!(report.actions[0].attempts, 1);
    }

    #[tokio::test]
    async fn should_broadcast_reports_to_subscribers() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let mut reports = scheduler.subscribe();
        let rule = compile(
            &RuleDefinition::builder()
                .name("observed")
                .action(step("x"))
                .build()
                .unwrap(),
        );
        let handle = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        let instance = handle.instance();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.instance, instance);
        assert_eq!(report.rule_name, "observed");
    }

    #[tokio::test]
    async fn should_cancel_everything_on_shutdown() {
        let (scheduler, _) = scheduler(SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("long")
                .action(delay(60.0))
                .build()
                .unwrap(),
        );
        let handle = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();

        scheduler.shutdown().await;

        let report = handle.wait().await.unwrap();
        assert_eq!(report.state, ExecutionState::Cancelled);
        assert!(scheduler.submit(Arc::clone(&rule), ctx(&rule)).is_dropped());
    }

    struct Panicker;

    impl ActionExecutor for Panicker {
        fn execute(
            &self,
            call: ActionCall<'_>,
            _checkpoint: Checkpoint,
        ) -> impl Future<Output = Result<(), ExecutionError>> + Send {
            let explode = call.action_type == "fail";
            async move {
                assert!(!explode, "executor blew up");
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn should_release_exclusive_rule_after_action_panics() {
        let scheduler = ExecutionScheduler::new(Panicker, SchedulerConfig::default());
        let rule = compile(
            &RuleDefinition::builder()
                .name("fragile")
                .exclusive(true)
                .on_conflict(ConflictPolicy::Drop)
                .action(ActionDefinition::new("fail"))
                .action(step("after"))
                .build()
                .unwrap(),
        );

        let first = scheduler.submit(Arc::clone(&rule), ctx(&rule)).handle().unwrap();
        let report = first.wait().await.unwrap();
        assert_eq!(report.state, ExecutionState::Failed);
        assert_eq!(report.actions[0].state, ActionState::Failed);
        assert!(report.actions[0].error.as_deref().unwrap().contains("panicked"));
        assert_eq!(report.actions[1].state, ActionState::Skipped);
        assert_eq!(scheduler.active_count(), 0);

        let second = scheduler.submit(Arc::clone(&rule), ctx(&rule));
        assert!(!second.is_dropped());
        let report = second.handle().unwrap().wait().await.unwrap();
        assert_eq!(report.state, ExecutionState::Failed);
    }
}
