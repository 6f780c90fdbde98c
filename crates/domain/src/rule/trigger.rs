//! Trigger: the condition over an incoming event that activates a rule.
//!
//! [`TriggerExpr`] is the raw, serialisable expression tree. Compiling it
//! against the [`Catalog`] produces a [`CompiledTrigger`] whose literals are
//! normalised [`Value`]s. Evaluation is three-valued: a comparison against a
//! field the event does not carry, or a value of an incompatible kind, is
//! [`Truth::Unknown`], which never counts as a match.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::TriggerError;
use crate::event::Event;
use crate::property::{PropertyDescriptor, Value, json_kind};
use crate::registry::TypeRegistry;

/// Comparison operator of a [`TriggerExpr::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field equals one of the listed values.
    In,
    /// String field contains the literal.
    Contains,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::In => "in",
            Self::Contains => "contains",
        }
    }

    fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw trigger expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerExpr {
    /// Matches every event.
    Always,
    /// Matches events of the given kind.
    EventKind { kind: String },
    /// Matches when the event carries the field.
    Exists { field: String },
    /// Compares an event field with a literal.
    Compare {
        field: String,
        op: CompareOp,
        value: serde_json::Value,
    },
    /// Logical AND; empty is true.
    All { conditions: Vec<TriggerExpr> },
    /// Logical OR; empty is false.
    Any { conditions: Vec<TriggerExpr> },
    Not { condition: Box<TriggerExpr> },
}

impl TriggerExpr {
    /// Shorthand for `kind == event.kind`.
    #[must_use]
    pub fn event_kind(kind: impl Into<String>) -> Self {
        Self::EventKind { kind: kind.into() }
    }

    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: serde_json::Value) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    #[must_use]
    pub fn all(conditions: Vec<TriggerExpr>) -> Self {
        Self::All { conditions }
    }

    #[must_use]
    pub fn any(conditions: Vec<TriggerExpr>) -> Self {
        Self::Any { conditions }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: TriggerExpr) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }
}

impl std::fmt::Display for TriggerExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::EventKind { kind } => write!(f, "kind({kind})"),
            Self::Exists { field } => write!(f, "exists({field})"),
            Self::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            Self::All { conditions } => write!(f, "all({})", conditions.len()),
            Self::Any { conditions } => write!(f, "any({})", conditions.len()),
            Self::Not { condition } => write!(f, "not({condition})"),
        }
    }
}

/// Result of evaluating a trigger node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    /// The event lacks the data to decide.
    Unknown,
}

impl Truth {
    fn from_bool(b: bool) -> Self {
        if b { Self::True } else { Self::False }
    }

    fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Single(Value),
    List(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Always,
    EventKind(String),
    Exists(String),
    Compare {
        field: String,
        op: CompareOp,
        literal: Literal,
    },
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
}

/// Executable form of a [`TriggerExpr`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTrigger {
    root: Node,
}

impl CompiledTrigger {
    /// Type-check literals and build the executable tree.
    ///
    /// A literal is checked against the field's descriptor only where an
    /// enclosing `all` fixes the event kind and that kind's schema declares
    /// the field. Other literals keep their JSON shape; fields the event
    /// lacks simply never match at evaluation time.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError`] when an operator cannot apply to its literal,
    /// or when a literal does not validate against a declared field.
    pub fn compile(
        expr: &TriggerExpr,
        catalog: &Catalog,
        registry: &TypeRegistry,
    ) -> Result<Self, TriggerError> {
        Ok(Self {
            root: compile_node(expr, None, catalog, registry)?,
        })
    }

    /// Three-valued evaluation with short-circuiting.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> Truth {
        eval(&self.root, event)
    }

    /// Whether the event activates the rule. `Unknown` is not a match.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.evaluate(event) == Truth::True
    }

    /// Names of all event fields the trigger reads.
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_fields(&self.root, &mut out);
        out
    }
}

/// `kind` is the event kind fixed by the nearest enclosing `all`, if any.
fn compile_node(
    expr: &TriggerExpr,
    kind: Option<&str>,
    catalog: &Catalog,
    registry: &TypeRegistry,
) -> Result<Node, TriggerError> {
    Ok(match expr {
        TriggerExpr::Always => Node::Always,
        TriggerExpr::EventKind { kind } => Node::EventKind(kind.clone()),
        TriggerExpr::Exists { field } => {
            if field.is_empty() {
                return Err(TriggerError::EmptyField);
            }
            Node::Exists(field.clone())
        }
        TriggerExpr::Compare { field, op, value } => {
            if field.is_empty() {
                return Err(TriggerError::EmptyField);
            }
            let declared = kind
                .and_then(|kind| catalog.event(kind))
                .and_then(|schema| schema.field(field))
                .map(|descriptor| (descriptor, registry));
            Node::Compare {
                field: field.clone(),
                op: *op,
                literal: compile_literal(field, *op, value, declared)?,
            }
        }
        TriggerExpr::All { conditions } => {
            let kind = conditions
                .iter()
                .find_map(|c| match c {
                    TriggerExpr::EventKind { kind } => Some(kind.as_str()),
                    _ => None,
                })
                .or(kind);
            Node::All(
                conditions
                    .iter()
                    .map(|c| compile_node(c, kind, catalog, registry))
                    .collect::<Result<_, _>>()?,
            )
        }
        TriggerExpr::Any { conditions } => Node::Any(
            conditions
                .iter()
                .map(|c| compile_node(c, kind, catalog, registry))
                .collect::<Result<_, _>>()?,
        ),
        TriggerExpr::Not { condition } => {
            Node::Not(Box::new(compile_node(condition, kind, catalog, registry)?))
        }
    })
}

type Declared<'a> = Option<(&'a Arc<PropertyDescriptor>, &'a TypeRegistry)>;

fn compile_literal(
    field: &str,
    op: CompareOp,
    raw: &serde_json::Value,
    declared: Declared<'_>,
) -> Result<Literal, TriggerError> {
    let mismatch = |literal: &'static str| TriggerError::OperatorMismatch {
        field: field.to_string(),
        op: op.as_str(),
        literal,
    };
    match op {
        CompareOp::In => {
            let serde_json::Value::Array(items) = raw else {
                return Err(mismatch(json_kind(raw)));
            };
            let values = items
                .iter()
                .map(|item| scalar(field, item, declared))
                .collect::<Result<_, _>>()?;
            Ok(Literal::List(values))
        }
        CompareOp::Contains => match raw {
            serde_json::Value::String(s) => Ok(Literal::Single(Value::String(s.clone()))),
            other => Err(mismatch(json_kind(other))),
        },
        _ => {
            let value = scalar(field, raw, declared)?;
            if op.is_ordering() && matches!(value, Value::Bool(_)) {
                return Err(mismatch("bool"));
            }
            Ok(Literal::Single(value))
        }
    }
}

/// Normalise a scalar literal, through the field descriptor when the
/// trigger's event kind declares one.
fn scalar(
    field: &str,
    raw: &serde_json::Value,
    declared: Declared<'_>,
) -> Result<Value, TriggerError> {
    if let Some((descriptor, registry)) = declared {
        return registry
            .validate(descriptor, raw)
            .map(crate::property::PropertyValue::into_value)
            .map_err(|source| TriggerError::InvalidLiteral {
                field: field.to_string(),
                source,
            });
    }
    match raw {
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().ok_or_else(|| TriggerError::UnsupportedLiteral {
                field: field.to_string(),
            })?),
        }),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        _ => Err(TriggerError::UnsupportedLiteral {
            field: field.to_string(),
        }),
    }
}

fn eval(node: &Node, event: &Event) -> Truth {
    match node {
        Node::Always => Truth::True,
        Node::EventKind(kind) => Truth::from_bool(event.kind == *kind),
        Node::Exists(field) => Truth::from_bool(event.field(field).is_some()),
        Node::Compare { field, op, literal } => match event.field(field) {
            Some(actual) => compare(actual, *op, literal),
            None => Truth::Unknown,
        },
        Node::All(children) => {
            let mut result = Truth::True;
            for child in children {
                match eval(child, event) {
                    Truth::False => return Truth::False,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::True => {}
                }
            }
            result
        }
        Node::Any(children) => {
            let mut result = Truth::False;
            for child in children {
                match eval(child, event) {
                    Truth::True => return Truth::True,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::False => {}
                }
            }
            result
        }
        Node::Not(child) => eval(child, event).negate(),
    }
}

fn compare(actual: &Value, op: CompareOp, literal: &Literal) -> Truth {
    use std::cmp::Ordering;

    match (op, literal) {
        (CompareOp::In, Literal::List(values)) => {
            let mut comparable = false;
            for value in values {
                match actual.compare(value) {
                    Some(Ordering::Equal) => return Truth::True,
                    Some(_) => comparable = true,
                    None => {}
                }
            }
            if comparable { Truth::False } else { Truth::Unknown }
        }
        (CompareOp::Contains, Literal::Single(Value::String(needle))) => match actual.as_str() {
            Some(haystack) => Truth::from_bool(haystack.contains(needle.as_str())),
            None => Truth::Unknown,
        },
        (_, Literal::Single(expected)) => match actual.compare(expected) {
            Some(ordering) => Truth::from_bool(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::In | CompareOp::Contains => false,
            }),
            None => Truth::Unknown,
        },
        _ => Truth::Unknown,
    }
}

fn collect_fields<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Exists(field) | Node::Compare { field, .. } => out.push(field),
        Node::All(children) | Node::Any(children) => {
            for child in children {
                collect_fields(child, out);
            }
        }
        Node::Not(child) => collect_fields(child, out),
        Node::Always | Node::EventKind(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EventSchema;
    use crate::property::{PropertySubType, PropertyType};
    use chrono::NaiveTime;
    use serde_json::json;

    fn catalog() -> Catalog {
        let registry = TypeRegistry::default();
        let mut catalog = Catalog::default();
        catalog.register_event(
            EventSchema::new("time.tick")
                .with_field(
                    registry
                        .describe("time", PropertyType::Time, PropertySubType::None)
                        .unwrap(),
                )
                .with_field(
                    registry
                        .describe("weekday", PropertyType::Int, PropertySubType::None)
                        .unwrap()
                        .with_range(1.0, 7.0),
                ),
        );
        catalog
    }

    fn compile(expr: &TriggerExpr) -> Result<CompiledTrigger, TriggerError> {
        CompiledTrigger::compile(expr, &catalog(), &TypeRegistry::default())
    }

    fn tick(hour: u32, minute: u32, weekday: i64) -> Event {
        Event::new("time.tick")
            .with_field(
                "time",
                Value::Time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()),
            )
            .with_field("weekday", Value::Int(weekday))
    }

    #[test]
    fn should_match_time_and_weekday() {
        let trigger = compile(&TriggerExpr::all(vec![
            TriggerExpr::event_kind("time.tick"),
            TriggerExpr::compare("time", CompareOp::Eq, json!("07:30")),
            TriggerExpr::compare("weekday", CompareOp::In, json!([1, 2, 3, 4, 5])),
        ]))
        .unwrap();

        assert!(trigger.matches(&tick(7, 30, 3)));
        assert!(!trigger.matches(&tick(7, 30, 6)));
        assert!(!trigger.matches(&tick(7, 31, 3)));
    }

    #[test]
    fn should_compile_undefined_field_and_never_match() {
        let trigger = compile(&TriggerExpr::compare("battery", CompareOp::Lt, json!(15))).unwrap();

        assert_eq!(trigger.evaluate(&tick(7, 30, 1)), Truth::Unknown);
        assert!(!trigger.matches(&tick(7, 30, 1)));
        assert!(!trigger.matches(&Event::new("debug.poke")));
    }

    #[test]
    fn should_keep_unknown_under_negation() {
        let trigger = compile(&TriggerExpr::not(TriggerExpr::compare(
            "battery",
            CompareOp::Eq,
            json!(100),
        )))
        .unwrap();
        assert!(!trigger.matches(&tick(7, 30, 1)));
    }

    #[test]
    fn should_short_circuit_all_on_false() {
        let trigger = compile(&TriggerExpr::all(vec![
            TriggerExpr::event_kind("debug.poke"),
            TriggerExpr::compare("battery", CompareOp::Eq, json!(1)),
        ]))
        .unwrap();
        assert_eq!(trigger.evaluate(&tick(7, 30, 1)), Truth::False);
    }

    #[test]
    fn should_short_circuit_any_on_true() {
        let trigger = compile(&TriggerExpr::any(vec![
            TriggerExpr::event_kind("time.tick"),
            TriggerExpr::compare("battery", CompareOp::Eq, json!(1)),
        ]))
        .unwrap();
        assert_eq!(trigger.evaluate(&tick(7, 30, 1)), Truth::True);
    }

    #[test]
    fn should_treat_incompatible_kinds_as_unknown() {
        let trigger = compile(&TriggerExpr::compare("label", CompareOp::Eq, json!(3))).unwrap();
        let event = Event::new("debug.poke").with_field("label", Value::String("three".into()));
        assert_eq!(trigger.evaluate(&event), Truth::Unknown);
    }

    #[test]
    fn should_reject_literal_that_fails_declared_field() {
        let err = compile(&TriggerExpr::all(vec![
            TriggerExpr::event_kind("time.tick"),
            TriggerExpr::compare("weekday", CompareOp::Eq, json!(9)),
        ]))
        .unwrap_err();
        assert!(matches!(err, TriggerError::InvalidLiteral { field, .. } if field == "weekday"));
    }

    #[test]
    fn should_validate_literal_nested_under_kind() {
        let err = compile(&TriggerExpr::all(vec![
            TriggerExpr::event_kind("time.tick"),
            TriggerExpr::any(vec![TriggerExpr::not(TriggerExpr::compare(
                "weekday",
                CompareOp::In,
                json!([1, 8]),
            ))]),
        ]))
        .unwrap_err();
        assert!(matches!(err, TriggerError::InvalidLiteral { .. }));
    }

    #[test]
    fn should_not_validate_literal_against_other_kind() {
        let trigger = compile(&TriggerExpr::all(vec![
            TriggerExpr::event_kind("sms.received"),
            TriggerExpr::compare("weekday", CompareOp::Eq, json!("someday")),
        ]))
        .unwrap();
        let sms = Event::new("sms.received").with_field("weekday", Value::String("someday".into()));
        assert!(trigger.matches(&sms));
    }

    #[test]
    fn should_not_validate_literal_without_fixed_kind() {
        let trigger =
            compile(&TriggerExpr::compare("weekday", CompareOp::Eq, json!("someday"))).unwrap();
        assert_eq!(trigger.evaluate(&tick(7, 30, 1)), Truth::Unknown);
    }

    #[test]
    fn should_reject_ordering_against_bool() {
        let err = compile(&TriggerExpr::compare("flag", CompareOp::Gt, json!(true))).unwrap_err();
        assert!(matches!(err, TriggerError::OperatorMismatch { op: "gt", .. }));
    }

    #[test]
    fn should_reject_in_without_list() {
        let err = compile(&TriggerExpr::compare("weekday", CompareOp::In, json!(1))).unwrap_err();
        assert!(matches!(err, TriggerError::OperatorMismatch { literal: "number", .. }));
    }

    #[test]
    fn should_reject_empty_field_name() {
        let err = compile(&TriggerExpr::Exists {
            field: String::new(),
        })
        .unwrap_err();
        assert_eq!(err, TriggerError::EmptyField);
    }

    #[test]
    fn should_match_contains_on_strings() {
        let trigger =
            compile(&TriggerExpr::compare("summary", CompareOp::Contains, json!("call"))).unwrap();
        let event = Event::new("notification").with_field("summary", Value::String("missed call".into()));
        assert!(trigger.matches(&event));
    }

    #[test]
    fn should_compare_numbers_across_int_and_double() {
        let trigger = compile(&TriggerExpr::compare("level", CompareOp::Ge, json!(0.5))).unwrap();
        let event = Event::new("battery").with_field("level", Value::Int(1));
        assert!(trigger.matches(&event));
    }

    #[test]
    fn should_list_referenced_fields() {
        let trigger = compile(&TriggerExpr::all(vec![
            TriggerExpr::Exists {
                field: "a".into(),
            },
            TriggerExpr::not(TriggerExpr::compare("b", CompareOp::Eq, json!(1))),
        ]))
        .unwrap();
        assert_eq!(trigger.referenced_fields(), vec!["a", "b"]);
    }

    #[test]
    fn should_deserialize_nested_expression_from_tagged_json() {
        let json = json!({
            "type": "all",
            "conditions": [
                {"type": "event_kind", "kind": "time.tick"},
                {"type": "compare", "field": "time", "op": "eq", "value": "07:30"}
            ]
        });
        let expr: TriggerExpr = serde_json::from_value(json).unwrap();
        assert!(matches!(expr, TriggerExpr::All { conditions } if conditions.len() == 2));
    }

    #[test]
    fn should_display_trigger_variants() {
        assert_eq!(TriggerExpr::Always.to_string(), "always");
        assert_eq!(TriggerExpr::event_kind("time.tick").to_string(), "kind(time.tick)");
        assert_eq!(
            TriggerExpr::compare("hour", CompareOp::Ge, json!(8)).to_string(),
            "hour ge 8"
        );
    }
}
