//! # phonebot-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `RuleRepository` port defined in `phonebot-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between rule definitions and database rows
//!
//! ## Dependency rule
//! Depends on `phonebot-app` (for port traits) and `phonebot-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod rule_repo;

pub use pool::{Config, Database};
pub use rule_repo::SqliteRuleRepository;
