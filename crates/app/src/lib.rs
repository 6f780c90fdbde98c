//! # phonebot-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement (driven/outbound ports):
//!   - `RuleRepository`: CRUD for rule definitions
//!   - `EventPublisher`: publish events onto the bus
//!   - `ActionExecutor`: perform the side effect of one action
//! - Provide the **runtime** of the rule system:
//!   - `PropertyStore`: versioned, copy-on-write action parameters
//!   - `RuleEngine`: compile definitions, evaluate triggers
//!   - `ExecutionScheduler`: run rule instances as tasks
//!   - `Dispatcher`: the single event-processing path
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `phonebot-domain` only (plus `tokio` and `tokio-util`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod dispatcher;
pub mod event_bus;
pub mod execution;
pub mod ports;
pub mod property_store;
pub mod rule_engine;
pub mod scheduler;
pub mod services;
