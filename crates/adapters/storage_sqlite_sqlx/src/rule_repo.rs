//! `SQLite` implementation of [`RuleRepository`].
//!
//! The definition is stored as JSON; `name` and `enabled` are mirrored into
//! their own columns for lookups.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use phonebot_app::ports::RuleRepository;
use phonebot_domain::error::PhoneBotError;
use phonebot_domain::id::RuleId;
use phonebot_domain::rule::RuleDefinition;
use phonebot_domain::time::now;

use crate::error::StorageError;

struct Wrapper(RuleDefinition);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<RuleDefinition> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let enabled: bool = row.try_get("enabled")?;
        let definition_json: String = row.try_get("definition")?;

        let id = RuleId::from_str(&id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let mut definition: RuleDefinition = serde_json::from_str(&definition_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        definition.id = id;
        definition.enabled = enabled;

        Ok(Self(definition))
    }
}

/// `SQLite`-backed rule repository.
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RuleRepository for SqliteRuleRepository {
    async fn create(&self, rule: RuleDefinition) -> Result<RuleDefinition, PhoneBotError> {
        let definition_json = serde_json::to_string(&rule).map_err(StorageError::from)?;
        let ts = now().to_rfc3339();

        sqlx::query(
            "INSERT INTO rules (id, name, enabled, definition, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(&rule.name)
        .bind(rule.enabled)
        .bind(&definition_json)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get_by_id(&self, id: RuleId) -> Result<Option<RuleDefinition>, PhoneBotError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<RuleDefinition>, PhoneBotError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM rules WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn get_all(&self) -> Result<Vec<RuleDefinition>, PhoneBotError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM rules ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_enabled(&self) -> Result<Vec<RuleDefinition>, PhoneBotError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM rules WHERE enabled = 1 ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, rule: RuleDefinition) -> Result<RuleDefinition, PhoneBotError> {
        let definition_json = serde_json::to_string(&rule).map_err(StorageError::from)?;

        sqlx::query(
            "UPDATE rules SET name = ?, enabled = ?, definition = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&rule.name)
        .bind(rule.enabled)
        .bind(&definition_json)
        .bind(now().to_rfc3339())
        .bind(rule.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn delete(&self, id: RuleId) -> Result<(), PhoneBotError> {
        sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
