//! Type registry: the closed set of `(type, subtype)` pairs and value validation.
//!
//! The registry is built once and is read-only afterwards, so a single
//! instance can be shared freely between threads.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{UnknownTypeError, ValidationError};
use crate::property::{
    PropertyDescriptor, PropertySubType, PropertyType, PropertyValue, Value, json_kind,
};
use crate::time::parse_time_of_day;

/// Registered `(type, subtype)` pairs.
const REGISTERED: [(PropertyType, PropertySubType); 7] = [
    (PropertyType::String, PropertySubType::None),
    (PropertyType::String, PropertySubType::Choice),
    (PropertyType::String, PropertySubType::Application),
    (PropertyType::Int, PropertySubType::None),
    (PropertyType::Double, PropertySubType::None),
    (PropertyType::Bool, PropertySubType::None),
    (PropertyType::Time, PropertySubType::None),
];

/// Describes and validates typed properties.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    pairs: HashSet<(PropertyType, PropertySubType)>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            pairs: REGISTERED.into_iter().collect(),
        }
    }
}

impl TypeRegistry {
    /// Whether the pair is part of the registry.
    #[must_use]
    pub fn is_registered(&self, ty: PropertyType, subtype: PropertySubType) -> bool {
        self.pairs.contains(&(ty, subtype))
    }

    /// Create a descriptor for a property of the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownTypeError`] when the pair is not registered, e.g.
    /// `(Int, Choice)`.
    pub fn describe(
        &self,
        name: impl Into<String>,
        ty: PropertyType,
        subtype: PropertySubType,
    ) -> Result<PropertyDescriptor, UnknownTypeError> {
        if !self.is_registered(ty, subtype) {
            return Err(UnknownTypeError { ty, subtype });
        }
        Ok(PropertyDescriptor::new(name.into(), ty, subtype))
    }

    /// Type-check and normalise `raw` against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the raw value has the wrong shape or
    /// violates the descriptor's constraints.
    pub fn validate(
        &self,
        descriptor: &Arc<PropertyDescriptor>,
        raw: &serde_json::Value,
    ) -> Result<PropertyValue, ValidationError> {
        let value = normalize(descriptor, raw)?;
        Ok(PropertyValue::new(Arc::clone(descriptor), value))
    }

    /// Re-validate an already typed value (e.g. an event field) against `descriptor`.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn validate_value(
        &self,
        descriptor: &Arc<PropertyDescriptor>,
        value: &Value,
    ) -> Result<PropertyValue, ValidationError> {
        self.validate(descriptor, &value.to_json())
    }
}

fn normalize(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    match descriptor.ty() {
        PropertyType::String => normalize_string(descriptor, raw),
        PropertyType::Int => normalize_int(descriptor, raw),
        PropertyType::Double => normalize_double(descriptor, raw),
        PropertyType::Bool => normalize_bool(descriptor, raw),
        PropertyType::Time => normalize_time(descriptor, raw),
    }
}

fn mismatch(descriptor: &PropertyDescriptor, raw: &serde_json::Value) -> ValidationError {
    ValidationError::TypeMismatch {
        property: descriptor.name().to_string(),
        expected: descriptor.ty(),
        found: json_kind(raw),
    }
}

fn normalize_string(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    let serde_json::Value::String(s) = raw else {
        return Err(mismatch(descriptor, raw));
    };
    let constraints = descriptor.constraints();
    match descriptor.subtype() {
        PropertySubType::Choice => {
            if !constraints.allows_choice(s) {
                return Err(ValidationError::NotAChoice {
                    property: descriptor.name().to_string(),
                    value: s.clone(),
                });
            }
        }
        PropertySubType::Application => {
            if s.trim().is_empty() {
                return Err(ValidationError::Empty {
                    property: descriptor.name().to_string(),
                });
            }
        }
        PropertySubType::None => {
            if constraints.non_empty && s.trim().is_empty() {
                return Err(ValidationError::Empty {
                    property: descriptor.name().to_string(),
                });
            }
        }
    }
    Ok(Value::String(s.clone()))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn normalize_int(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    let value = match raw {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64().ok_or_else(|| mismatch(descriptor, raw))?;
                if f.fract() != 0.0 || f < i64::MIN as f64 || f >= i64::MAX as f64 {
                    return Err(mismatch(descriptor, raw));
                }
                f as i64
            }
        },
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| mismatch(descriptor, raw))?,
        _ => return Err(mismatch(descriptor, raw)),
    };
    check_range(descriptor, value as f64)?;
    Ok(Value::Int(value))
}

fn normalize_double(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(descriptor, raw))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| mismatch(descriptor, raw))?,
        _ => return Err(mismatch(descriptor, raw)),
    };
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            property: descriptor.name().to_string(),
        });
    }
    check_range(descriptor, value)?;
    Ok(Value::Double(value))
}

fn normalize_bool(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    match raw {
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) if s == "true" => Ok(Value::Bool(true)),
        serde_json::Value::String(s) if s == "false" => Ok(Value::Bool(false)),
        _ => Err(mismatch(descriptor, raw)),
    }
}

fn normalize_time(
    descriptor: &PropertyDescriptor,
    raw: &serde_json::Value,
) -> Result<Value, ValidationError> {
    let invalid = || ValidationError::InvalidTime {
        property: descriptor.name().to_string(),
        value: raw.to_string(),
    };
    match raw {
        serde_json::Value::String(s) => parse_time_of_day(s).map(Value::Time).ok_or_else(invalid),
        serde_json::Value::Object(map) => {
            let hour = map.get("hour").and_then(serde_json::Value::as_u64);
            let minute = map.get("minute").and_then(serde_json::Value::as_u64);
            match (hour, minute) {
                (Some(h), Some(m)) if h < 24 && m < 60 => {
                    let h = u32::try_from(h).map_err(|_| invalid())?;
                    let m = u32::try_from(m).map_err(|_| invalid())?;
                    chrono::NaiveTime::from_hms_opt(h, m, 0)
                        .map(Value::Time)
                        .ok_or_else(invalid)
                }
                _ => Err(invalid()),
            }
        }
        _ => Err(mismatch(descriptor, raw)),
    }
}

fn check_range(descriptor: &PropertyDescriptor, value: f64) -> Result<(), ValidationError> {
    let constraints = descriptor.constraints();
    let below = constraints.min.is_some_and(|min| value < min);
    let above = constraints.max.is_some_and(|max| value > max);
    if below || above {
        return Err(ValidationError::OutOfRange {
            property: descriptor.name().to_string(),
            value,
            min: constraints.min,
            max: constraints.max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        TypeRegistry::default()
    }

    fn describe(
        name: &str,
        ty: PropertyType,
        subtype: PropertySubType,
    ) -> Arc<PropertyDescriptor> {
        Arc::new(registry().describe(name, ty, subtype).unwrap())
    }

    #[test]
    fn should_fail_describe_for_every_unregistered_pair() {
        let reg = registry();
        let types = [
            PropertyType::String,
            PropertyType::Int,
            PropertyType::Double,
            PropertyType::Bool,
            PropertyType::Time,
        ];
        let subtypes = [
            PropertySubType::None,
            PropertySubType::Choice,
            PropertySubType::Application,
        ];
        for ty in types {
            for subtype in subtypes {
                let result = reg.describe("p", ty, subtype);
                if REGISTERED.contains(&(ty, subtype)) {
                    assert!(result.is_ok(), "{ty}/{subtype} should be registered");
                } else {
                    assert_eq!(result.unwrap_err(), UnknownTypeError { ty, subtype });
                }
            }
        }
    }

    #[test]
    fn should_accept_in_range_int() {
        let d = Arc::new(
            registry()
                .describe("volume", PropertyType::Int, PropertySubType::None)
                .unwrap()
                .with_range(0.0, 100.0),
        );
        let v = registry().validate(&d, &json!(40)).unwrap();
        assert_eq!(v.value(), &Value::Int(40));
        assert_eq!(v.name(), "volume");
    }

    #[test]
    fn should_reject_out_of_range_int() {
        let d = Arc::new(
            registry()
                .describe("volume", PropertyType::Int, PropertySubType::None)
                .unwrap()
                .with_range(0.0, 100.0),
        );
        let err = registry().validate(&d, &json!(101)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { value, .. } if value == 101.0));
    }

    #[test]
    fn should_normalize_integral_float_and_numeric_string_to_int() {
        let d = describe("count", PropertyType::Int, PropertySubType::None);
        assert_eq!(registry().validate(&d, &json!(3.0)).unwrap().value(), &Value::Int(3));
        assert_eq!(registry().validate(&d, &json!(" 7 ")).unwrap().value(), &Value::Int(7));
    }

    #[test]
    fn should_reject_fractional_int() {
        let d = describe("count", PropertyType::Int, PropertySubType::None);
        let err = registry().validate(&d, &json!(3.5)).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { found: "number", .. }));
    }

    #[test]
    fn should_reject_float_beyond_int_range() {
        let d = describe("count", PropertyType::Int, PropertySubType::None);
        let err = registry().validate(&d, &json!(9_223_372_036_854_775_808.0)).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
        let err = registry().validate(&d, &json!("9223372036854775808")).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn should_reject_mistyped_values() {
        let reg = registry();
        let cases = [
            (describe("s", PropertyType::String, PropertySubType::None), json!(1)),
            (describe("i", PropertyType::Int, PropertySubType::None), json!(true)),
            (describe("d", PropertyType::Double, PropertySubType::None), json!("abc")),
            (describe("b", PropertyType::Bool, PropertySubType::None), json!(1)),
            (describe("t", PropertyType::Time, PropertySubType::None), json!(12)),
        ];
        for (descriptor, raw) in cases {
            let err = reg.validate(&descriptor, &raw).unwrap_err();
            assert!(
                matches!(err, ValidationError::TypeMismatch { .. }),
                "{} accepted {raw}",
                descriptor.name()
            );
        }
    }

    #[test]
    fn should_reject_non_finite_double() {
        let d = describe("ratio", PropertyType::Double, PropertySubType::None);
        let err = registry().validate(&d, &json!("NaN")).unwrap_err();
        assert!(matches!(err, ValidationError::NotFinite { .. }));
    }

    #[test]
    fn should_accept_bool_strings() {
        let d = describe("enable", PropertyType::Bool, PropertySubType::None);
        assert_eq!(registry().validate(&d, &json!("true")).unwrap().value(), &Value::Bool(true));
        assert_eq!(registry().validate(&d, &json!("false")).unwrap().value(), &Value::Bool(false));
        assert_eq!(registry().validate(&d, &json!(false)).unwrap().value(), &Value::Bool(false));
    }

    #[test]
    fn should_reject_bool_strings_in_other_case() {
        let d = describe("enable", PropertyType::Bool, PropertySubType::None);
        for raw in [json!("TRUE"), json!("False"), json!(" true")] {
            let err = registry().validate(&d, &raw).unwrap_err();
            assert!(matches!(err, ValidationError::TypeMismatch { .. }), "accepted {raw}");
        }
    }

    #[test]
    fn should_accept_declared_choice_only() {
        let d = Arc::new(
            registry()
                .describe("profile", PropertyType::String, PropertySubType::Choice)
                .unwrap()
                .with_choice("Silent profile", "silent"),
        );
        assert!(registry().validate(&d, &json!("silent")).is_ok());
        let err = registry().validate(&d, &json!("loud")).unwrap_err();
        assert!(matches!(err, ValidationError::NotAChoice { value, .. } if value == "loud"));
    }

    #[test]
    fn should_reject_blank_application() {
        let d = describe("application", PropertyType::String, PropertySubType::Application);
        let err = registry().validate(&d, &json!("   ")).unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn should_reject_blank_string_when_non_empty() {
        let d = Arc::new(
            registry()
                .describe("url", PropertyType::String, PropertySubType::None)
                .unwrap()
                .non_empty(),
        );
        assert!(registry().validate(&d, &json!("")).is_err());
        assert!(registry().validate(&d, &json!("https://example.org")).is_ok());
    }

    #[test]
    fn should_normalize_time_from_string_and_object() {
        let d = describe("at", PropertyType::Time, PropertySubType::None);
        let expected = Value::Time(NaiveTime::from_hms_opt(7, 45, 0).unwrap());
        assert_eq!(registry().validate(&d, &json!("07:45")).unwrap().value(), &expected);
        assert_eq!(
            registry()
                .validate(&d, &json!({"hour": 7, "minute": 45}))
                .unwrap()
                .value(),
            &expected
        );
    }

    #[test]
    fn should_reject_time_object_out_of_bounds() {
        let d = describe("at", PropertyType::Time, PropertySubType::None);
        let err = registry()
            .validate(&d, &json!({"hour": 24, "minute": 0}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTime { .. }));
    }

    #[test]
    fn should_revalidate_typed_value() {
        let d = describe("at", PropertyType::Time, PropertySubType::None);
        let v = Value::Time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(registry().validate_value(&d, &v).unwrap().value(), &v);
    }
}
