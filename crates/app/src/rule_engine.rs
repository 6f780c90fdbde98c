//! Rule engine: compiles rule definitions and matches events against them.
//!
//! Compilation resolves every action type in the [`Catalog`], type-checks
//! literal parameters into a per-action [`PropertyStore`], and compiles the
//! trigger. Evaluation is synchronous and never blocks on execution.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use phonebot_domain::catalog::{ActionSchema, Catalog};
use phonebot_domain::error::{
    CompileError, CompileErrorKind, NotFoundError, PhoneBotError, ValidationError,
};
use phonebot_domain::event::Event;
use phonebot_domain::id::RuleId;
use phonebot_domain::presentation::{PresentationTable, SelectorRequest, Widget};
use phonebot_domain::property::{PropertyDescriptor, PropertyValue};
use phonebot_domain::registry::TypeRegistry;
use phonebot_domain::rule::{
    CompiledTrigger, ConflictPolicy, ParamSource, RuleDefinition,
};

use crate::property_store::PropertyStore;

/// Executable form of one action.
#[derive(Debug)]
pub struct CompiledAction {
    schema: ActionSchema,
    store: Arc<PropertyStore>,
    /// Parameter name → event field it is filled from.
    bindings: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CompiledAction {
    #[must_use]
    pub fn action_type(&self) -> &str {
        &self.schema.action_type
    }

    #[must_use]
    pub fn schema(&self) -> &ActionSchema {
        &self.schema
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PropertyStore> {
        &self.store
    }

    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Deadline declared on the action itself.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Human readable one-liner built from the current store values.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        self.schema.summarize(&self.store.snapshot().to_values())
    }
}

/// Executable form of a [`RuleDefinition`].
#[derive(Debug)]
pub struct CompiledRule {
    definition: RuleDefinition,
    trigger: CompiledTrigger,
    actions: Vec<CompiledAction>,
}

impl CompiledRule {
    #[must_use]
    pub fn id(&self) -> RuleId {
        self.definition.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.definition.enabled
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.definition.exclusive
    }

    /// Per-rule conflict policy, when the definition sets one.
    #[must_use]
    pub fn on_conflict(&self) -> Option<ConflictPolicy> {
        self.definition.on_conflict
    }

    #[must_use]
    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    #[must_use]
    pub fn trigger(&self) -> &CompiledTrigger {
        &self.trigger
    }

    #[must_use]
    pub fn actions(&self) -> &[CompiledAction] {
        &self.actions
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.trigger.matches(event)
    }
}

/// Result of compiling a batch of definitions; one bad rule does not
/// prevent the others from compiling.
#[derive(Debug, Default)]
pub struct CompileReport {
    pub compiled: Vec<CompiledRule>,
    pub failures: Vec<CompileError>,
}

/// One property of a configured action as the UI sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyView {
    pub descriptor: Arc<PropertyDescriptor>,
    pub value: Option<PropertyValue>,
    pub widget: Widget,
}

/// Holds the active rule set.
#[derive(Debug)]
pub struct RuleEngine {
    catalog: Arc<Catalog>,
    registry: Arc<TypeRegistry>,
    presentation: PresentationTable,
    rules: RwLock<Vec<Arc<CompiledRule>>>,
}

impl RuleEngine {
    /// Create an engine with the default type registry and presentation table.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_registry(catalog, Arc::new(TypeRegistry::default()))
    }

    #[must_use]
    pub fn with_registry(catalog: Arc<Catalog>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            catalog,
            registry,
            presentation: PresentationTable::default(),
            rules: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Turn a definition into its executable form.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] naming the rule when the definition is
    /// invalid, references an unknown action type or parameter, carries a
    /// literal that fails validation, lacks a required parameter, or has a
    /// trigger that does not type-check.
    pub fn compile(&self, def: &RuleDefinition) -> Result<CompiledRule, CompileError> {
        let fail = |kind| CompileError {
            rule: def.name.clone(),
            kind,
        };

        def.check_invariants()
            .map_err(|e| fail(CompileErrorKind::InvalidDefinition(e)))?;
        let trigger = CompiledTrigger::compile(&def.trigger, &self.catalog, &self.registry)
            .map_err(|e| fail(CompileErrorKind::InvalidTrigger(e)))?;

        let mut actions = Vec::with_capacity(def.actions.len());
        for (index, action) in def.actions.iter().enumerate() {
            let schema = self.catalog.action(&action.action_type).ok_or_else(|| {
                fail(CompileErrorKind::UnknownActionType {
                    index,
                    action_type: action.action_type.clone(),
                })
            })?;

            let mut literals = Vec::new();
            let mut bindings = BTreeMap::new();
            for (name, source) in &action.params {
                if schema.property(name).is_none() {
                    return Err(fail(CompileErrorKind::UnknownParameter {
                        index,
                        parameter: name.clone(),
                    }));
                }
                match source {
                    ParamSource::Literal(raw) => literals.push((name.as_str(), raw)),
                    ParamSource::EventField { event_field } => {
                        if event_field.trim().is_empty() {
                            return Err(fail(CompileErrorKind::EmptyBinding {
                                index,
                                parameter: name.clone(),
                            }));
                        }
                        bindings.insert(name.clone(), event_field.clone());
                    }
                }
            }

            let store = PropertyStore::seeded(
                Arc::clone(&self.registry),
                schema.properties.iter().cloned(),
                literals,
            )
            .map_err(|source| fail(CompileErrorKind::InvalidParameter { index, source }))?;

            let snapshot = store.snapshot();
            let missing = schema.properties.iter().find(|d| {
                d.is_required()
                    && snapshot.get(d.name()).is_none()
                    && !bindings.contains_key(d.name())
            });
            if let Some(descriptor) = missing {
                return Err(fail(CompileErrorKind::InvalidParameter {
                    index,
                    source: ValidationError::MissingProperty {
                        property: descriptor.name().to_string(),
                    },
                }));
            }

            actions.push(CompiledAction {
                schema: schema.clone(),
                store: Arc::new(store),
                bindings,
                timeout: action.timeout_ms.map(Duration::from_millis),
            });
        }

        Ok(CompiledRule {
            definition: def.clone(),
            trigger,
            actions,
        })
    }

    /// Compile each definition in isolation.
    pub fn compile_all<'a>(
        &self,
        defs: impl IntoIterator<Item = &'a RuleDefinition>,
    ) -> CompileReport {
        let mut report = CompileReport::default();
        for def in defs {
            match self.compile(def) {
                Ok(rule) => report.compiled.push(rule),
                Err(err) => {
                    tracing::warn!(rule = %err.rule, error = %err.kind, "rule failed to compile");
                    report.failures.push(err);
                }
            }
        }
        report
    }

    /// Replace the active rule set. Returns the rules that did not compile.
    pub fn load<'a>(
        &self,
        defs: impl IntoIterator<Item = &'a RuleDefinition>,
    ) -> Vec<CompileError> {
        let report = self.compile_all(defs);
        let active: Vec<Arc<CompiledRule>> = report.compiled.into_iter().map(Arc::new).collect();
        tracing::info!(
            loaded = active.len(),
            failed = report.failures.len(),
            "rule set loaded"
        );
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = active;
        report.failures
    }

    /// Enabled rules whose trigger matches `event`, in load order.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> Vec<Arc<CompiledRule>> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let matched: Vec<Arc<CompiledRule>> = rules
            .iter()
            .filter(|rule| rule.is_enabled() && rule.matches(event))
            .cloned()
            .collect();
        tracing::debug!(kind = %event.kind, matched = matched.len(), "event evaluated");
        matched
    }

    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<Arc<CompiledRule>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|rule| rule.id() == id)
            .cloned()
    }

    #[must_use]
    pub fn rules(&self) -> Vec<Arc<CompiledRule>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Push a UI-edited value into an action's store. Returns the new
    /// store version.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::NotFound`] when the rule or action does not
    /// exist, or [`PhoneBotError::Validation`] when the value is rejected.
    pub fn set_action_property(
        &self,
        rule_id: RuleId,
        action_index: usize,
        name: &str,
        raw: &serde_json::Value,
    ) -> Result<u64, PhoneBotError> {
        let rule = self.require_rule(rule_id)?;
        let action = require_action(&rule, action_index)?;
        let version = action.store().set(name, raw)?;
        tracing::debug!(%rule_id, action_index, property = name, version, "action property set");
        Ok(version)
    }

    /// Which selector screen edits `name`, or `None` when it is edited inline.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::NotFound`] when the rule or action does not
    /// exist, or [`PhoneBotError::Validation`] for an unknown property.
    pub fn selector_request(
        &self,
        rule_id: RuleId,
        action_index: usize,
        name: &str,
    ) -> Result<Option<SelectorRequest>, PhoneBotError> {
        let rule = self.require_rule(rule_id)?;
        let action = require_action(&rule, action_index)?;
        let descriptor = action.store().descriptor(name).ok_or_else(|| {
            ValidationError::UnknownProperty {
                property: name.to_string(),
            }
        })?;
        Ok(self
            .presentation
            .selector_request(descriptor, rule_id, action_index))
    }

    /// Every property of an action with its current value and widget.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneBotError::NotFound`] when the rule or action does not exist.
    pub fn action_properties(
        &self,
        rule_id: RuleId,
        action_index: usize,
    ) -> Result<Vec<PropertyView>, PhoneBotError> {
        let rule = self.require_rule(rule_id)?;
        let action = require_action(&rule, action_index)?;
        let snapshot = action.store().snapshot();
        Ok(action
            .schema()
            .properties
            .iter()
            .map(|descriptor| PropertyView {
                descriptor: Arc::clone(descriptor),
                value: snapshot.get(descriptor.name()).cloned(),
                widget: self.presentation.widget_for(descriptor),
            })
            .collect())
    }

    fn require_rule(&self, id: RuleId) -> Result<Arc<CompiledRule>, NotFoundError> {
        self.rule(id).ok_or_else(|| NotFoundError {
            entity: "Rule",
            id: id.to_string(),
        })
    }
}

fn require_action(rule: &CompiledRule, index: usize) -> Result<&CompiledAction, NotFoundError> {
    rule.actions().get(index).ok_or_else(|| NotFoundError {
        entity: "Action",
        id: format!("{}#{index}", rule.id()),
    })
}
