//! Rule service: use-cases for managing rule definitions.

use phonebot_domain::error::{CompileError, NotFoundError, PhoneBotError};
use phonebot_domain::id::RuleId;
use phonebot_domain::rule::RuleDefinition;

use crate::ports::RuleRepository;
use crate::rule_engine::RuleEngine;

/// Application service for rule CRUD and for (re)loading the engine.
pub struct RuleService<R> {
    repo: R,
}

impl<R: RuleRepository> RuleService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Create a new rule after validating domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: RuleDefinition) -> Result<RuleDefinition, PhoneBotError> {
        rule.validate()?;
        self.repo.create(rule).await
    }

    /// Look up a rule by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::NotFound`] when no rule with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<RuleDefinition, PhoneBotError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Rule",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_rules(&self) -> Result<Vec<RuleDefinition>, PhoneBotError> {
        self.repo.get_all().await
    }

    /// Get all enabled rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_enabled(&self) -> Result<Vec<RuleDefinition>, PhoneBotError> {
        self.repo.get_enabled().await
    }

    /// Update an existing rule.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn update_rule(&self, rule: RuleDefinition) -> Result<RuleDefinition, PhoneBotError> {
        rule.validate()?;
        self.repo.update(rule).await
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::NotFound`] if the rule does not exist, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        id: RuleId,
        enabled: bool,
    ) -> Result<RuleDefinition, PhoneBotError> {
        let mut rule = self.get_rule(id).await?;
        rule.enabled = enabled;
        self.repo.update(rule).await
    }

    /// Delete a rule by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), PhoneBotError> {
        self.repo.delete(id).await
    }

    /// Store a rule coming from outside (e.g. a rule file), replacing the
    /// stored rule of the same name and keeping its id.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn import_rule(
        &self,
        mut rule: RuleDefinition,
    ) -> Result<RuleDefinition, PhoneBotError> {
        rule.validate()?;
        match self.repo.get_by_name(&rule.name).await? {
            Some(existing) => {
                rule.id = existing.id;
                tracing::debug!(id = %rule.id, "replacing stored rule");
                self.repo.update(rule).await
            }
            None => self.repo.create(rule).await,
        }
    }

    /// Compile every enabled rule into `engine`, replacing its rule set.
    /// Returns the rules that failed to compile; the others are active.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self, engine))]
    pub async fn reload(&self, engine: &RuleEngine) -> Result<Vec<CompileError>, PhoneBotError> {
        let rules = self.repo.get_enabled().await?;
        Ok(engine.load(&rules))
    }
}
