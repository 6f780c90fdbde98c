//! Rule repository port: persistence for rule definitions.

use std::future::Future;

use phonebot_domain::error::PhoneBotError;
use phonebot_domain::id::RuleId;
use phonebot_domain::rule::RuleDefinition;

/// Persistence for [`RuleDefinition`]s.
pub trait RuleRepository {
    /// Store a new rule.
    fn create(
        &self,
        rule: RuleDefinition,
    ) -> impl Future<Output = Result<RuleDefinition, PhoneBotError>> + Send;

    /// Get a rule by id.
    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<RuleDefinition>, PhoneBotError>> + Send;

    /// Get a rule by its (unique) name.
    fn get_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<RuleDefinition>, PhoneBotError>> + Send;

    /// List all rules.
    fn get_all(&self) -> impl Future<Output = Result<Vec<RuleDefinition>, PhoneBotError>> + Send;

    /// List enabled rules only.
    fn get_enabled(
        &self,
    ) -> impl Future<Output = Result<Vec<RuleDefinition>, PhoneBotError>> + Send;

    /// Replace an existing rule.
    fn update(
        &self,
        rule: RuleDefinition,
    ) -> impl Future<Output = Result<RuleDefinition, PhoneBotError>> + Send;

    /// Delete a rule by id.
    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), PhoneBotError>> + Send;
}
