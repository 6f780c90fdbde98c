//! # phonebotd: phonebot daemon
//!
//! Composition root that wires all adapters together and runs the engine.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialise logging
//! - Initialise the `SQLite` connection pool and run migrations
//! - Import rule files and compile the enabled rules
//! - Start the clock, the debug poke source, the dispatcher and the
//!   execution scheduler
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod rules;

use std::sync::Arc;

use phonebot_adapter_builtin::{BuiltinExecutor, Clock, Poke};
use phonebot_adapter_storage_sqlite_sqlx::{Config as DbConfig, SqliteRuleRepository};
use phonebot_app::dispatcher::Dispatcher;
use phonebot_app::event_bus::InProcessEventBus;
use phonebot_app::execution::{ExecutionReport, ExecutionState};
use phonebot_app::ports::RuleRepository;
use phonebot_app::rule_engine::RuleEngine;
use phonebot_app::scheduler::ExecutionScheduler;
use phonebot_app::services::rule_service::RuleService;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Database
    let db = DbConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let rule_service = RuleService::new(SqliteRuleRepository::new(db.pool().clone()));

    // Rules
    import_rule_files(&rule_service, &config.rules.dir).await?;
    let engine = Arc::new(RuleEngine::new(Arc::new(phonebot_adapter_builtin::catalog()?)));
    for err in rule_service.reload(&engine).await? {
        tracing::warn!(error = %err, cause = ?std::error::Error::source(&err), "rule not loaded");
    }
    tracing::info!(count = engine.rules().len(), "rules active");

    // Runtime
    let event_bus = Arc::new(InProcessEventBus::new(config.scheduler.event_bus_capacity));
    let scheduler = ExecutionScheduler::new(
        BuiltinExecutor::new(Arc::clone(&event_bus)),
        config.scheduler_config(),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&engine), scheduler.clone()));
    let shutdown = CancellationToken::new();

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn({
        let dispatcher = Arc::clone(&dispatcher);
        let events = event_bus.subscribe();
        let shutdown = shutdown.clone();
        async move { dispatcher.run(events, shutdown).await }
    });
    tasks.spawn(log_reports(scheduler.subscribe(), shutdown.clone()));
    if config.clock.enabled {
        let clock = Clock::new(Arc::clone(&event_bus));
        let shutdown = shutdown.clone();
        tasks.spawn(async move { clock.run(shutdown).await });
    }
    if config.debug.poke_on_signal {
        let (pokes_tx, pokes) = tokio::sync::mpsc::channel(8);
        spawn_poke_signal(&mut tasks, pokes_tx, config.debug.poke_path.clone(), shutdown.clone())?;
        let poke = Poke::new(Arc::clone(&event_bus));
        let shutdown = shutdown.clone();
        tasks.spawn(async move { poke.run(pokes, shutdown).await });
    }

    tracing::info!("phonebotd running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    shutdown.cancel();
    scheduler.shutdown().await;
    while tasks.join_next().await.is_some() {}

    Ok(())
}

/// Upsert every readable rule file; broken files are logged and skipped.
async fn import_rule_files<R: RuleRepository>(
    service: &RuleService<R>,
    dir: &std::path::Path,
) -> Result<(), rules::RuleFileError> {
    for result in rules::read_rule_dir(dir)? {
        let rule = match result {
            Ok(rule) => rule,
            Err(err) => {
                tracing::warn!(error = %err, cause = ?std::error::Error::source(&err), "skipping rule file");
                continue;
            }
        };
        let name = rule.name.clone();
        match service.import_rule(rule).await {
            Ok(stored) => tracing::info!(rule = %name, id = %stored.id, "imported rule"),
            Err(err) => tracing::warn!(rule = %name, error = %err, "failed to import rule"),
        }
    }
    Ok(())
}

/// Forward every `SIGUSR1` as a poke on `path`.
#[cfg(unix)]
fn spawn_poke_signal(
    tasks: &mut tokio::task::JoinSet<()>,
    pokes: tokio::sync::mpsc::Sender<String>,
    path: String,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    tracing::info!(%path, "SIGUSR1 publishes debug.poke");
    tasks.spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = usr1.recv() => {
                    if received.is_none() || pokes.send(path.clone()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_poke_signal(
    _tasks: &mut tokio::task::JoinSet<()>,
    _pokes: tokio::sync::mpsc::Sender<String>,
    _path: String,
    _shutdown: CancellationToken,
) -> std::io::Result<()> {
    tracing::warn!("debug pokes on signal are only available on unix");
    Ok(())
}

async fn log_reports(
    mut reports: tokio::sync::broadcast::Receiver<ExecutionReport>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = reports.recv() => match received {
                Ok(report) => log_report(&report),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "report logger lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn log_report(report: &ExecutionReport) {
    match report.state {
        ExecutionState::Completed => tracing::info!(
            rule = %report.rule_name,
            instance = %report.instance,
            actions = report.actions.len(),
            "rule completed"
        ),
        state => {
            let stopped = report.stopped_at();
            tracing::warn!(
                rule = %report.rule_name,
                instance = %report.instance,
                %state,
                action = stopped.map(|o| o.action_type.as_str()),
                error = stopped.and_then(|o| o.error.as_deref()),
                "rule did not complete"
            );
        }
    }
}
