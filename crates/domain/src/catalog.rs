//! Catalog of known action and event shapes.
//!
//! An [`ActionSchema`] lists the typed properties an action type accepts; an
//! [`EventSchema`] lists the typed fields an event kind carries. The rule
//! compiler resolves descriptors through the catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::property::{PropertyDescriptor, Value};

/// Schema of one action type.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub action_type: String,
    /// Human readable name, e.g. `"Open URL"`.
    pub name: String,
    pub description: String,
    pub properties: Vec<Arc<PropertyDescriptor>>,
    /// Summary template with `{property}` placeholders.
    pub summary: Option<String>,
}

impl ActionSchema {
    #[must_use]
    pub fn new(action_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            name: name.into(),
            description: String::new(),
            properties: Vec::new(),
            summary: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(Arc::new(descriptor));
        self
    }

    #[must_use]
    pub fn with_summary(mut self, template: impl Into<String>) -> Self {
        self.summary = Some(template.into());
        self
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.properties.iter().find(|d| d.name() == name)
    }

    /// Render the summary template with the given values.
    ///
    /// Returns `None` when there is no template or a referenced value is
    /// missing or blank.
    #[must_use]
    pub fn summarize(&self, values: &BTreeMap<String, Value>) -> Option<String> {
        let template = self.summary.as_deref()?;
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let end = rest[start..].find('}')? + start;
            let name = &rest[start + 1..end];
            let rendered = values.get(name)?.to_string();
            if rendered.trim().is_empty() {
                return None;
            }
            out.push_str(&rendered);
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        Some(out)
    }
}

/// Schema of one event kind.
#[derive(Debug, Clone)]
pub struct EventSchema {
    pub kind: String,
    pub fields: Vec<Arc<PropertyDescriptor>>,
}

impl EventSchema {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, descriptor: PropertyDescriptor) -> Self {
        self.fields.push(Arc::new(descriptor));
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.fields.iter().find(|d| d.name() == name)
    }
}

/// All known action and event schemas.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    actions: HashMap<String, ActionSchema>,
    events: HashMap<String, EventSchema>,
}

impl Catalog {
    /// Register (or replace) an action schema.
    pub fn register_action(&mut self, schema: ActionSchema) {
        self.actions.insert(schema.action_type.clone(), schema);
    }

    /// Register (or replace) an event schema.
    pub fn register_event(&mut self, schema: EventSchema) {
        self.events.insert(schema.kind.clone(), schema);
    }

    #[must_use]
    pub fn action(&self, action_type: &str) -> Option<&ActionSchema> {
        self.actions.get(action_type)
    }

    #[must_use]
    pub fn event(&self, kind: &str) -> Option<&EventSchema> {
        self.events.get(kind)
    }

    /// Registered action types, sorted.
    #[must_use]
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertySubType, PropertyType};
    use crate::registry::TypeRegistry;

    fn open_url_schema() -> ActionSchema {
        let url = TypeRegistry::default()
            .describe("url", PropertyType::String, PropertySubType::None)
            .unwrap()
            .non_empty()
            .required();
        ActionSchema::new("open_url", "Open URL")
            .with_property(url)
            .with_summary("Open url {url}")
    }

    #[test]
    fn should_find_registered_action() {
        let mut catalog = Catalog::default();
        catalog.register_action(open_url_schema());
        let schema = catalog.action("open_url").unwrap();
        assert!(schema.property("url").is_some());
        assert!(schema.property("nope").is_none());
        assert!(catalog.action("teleport").is_none());
    }

    #[test]
    fn should_list_action_types_sorted() {
        let mut catalog = Catalog::default();
        catalog.register_action(ActionSchema::new("log", "Log"));
        catalog.register_action(ActionSchema::new("delay", "Delay"));
        assert_eq!(catalog.action_types(), vec!["delay", "log"]);
    }

    #[test]
    fn should_render_summary_template() {
        let schema = open_url_schema();
        let values = BTreeMap::from([(
            "url".to_string(),
            Value::String("https://example.org".into()),
        )]);
        assert_eq!(
            schema.summarize(&values).as_deref(),
            Some("Open url https://example.org")
        );
    }

    #[test]
    fn should_not_render_summary_with_blank_value() {
        let schema = open_url_schema();
        let values = BTreeMap::from([("url".to_string(), Value::String(String::new()))]);
        assert!(schema.summarize(&values).is_none());
        assert!(schema.summarize(&BTreeMap::new()).is_none());
    }

    #[test]
    fn should_find_declared_event_field() {
        let hour = TypeRegistry::default()
            .describe("hour", PropertyType::Int, PropertySubType::None)
            .unwrap();
        let mut catalog = Catalog::default();
        catalog.register_event(EventSchema::new("time.tick").with_field(hour));
        let tick = catalog.event("time.tick").unwrap();
        assert!(tick.field("hour").is_some());
        assert!(tick.field("battery").is_none());
        assert!(catalog.event("sms.received").is_none());
    }
}
