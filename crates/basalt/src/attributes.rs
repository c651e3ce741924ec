//! Attribute values and attribute maps.
//!
//! Every fact about a subject, resource, or environment is an
//! [`AttributeValue`]: a runtime-typed, possibly nested value fetched from an
//! external attribute source at request time. [`Attributes`] is the map a
//! fetcher hands to the engine; it is never mutated during evaluation.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A named collection of attributes for one subject, resource, or environment.
///
/// Keys are unique; iteration order is deterministic but carries no meaning.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A runtime-typed attribute value.
///
/// Matchers and predicates see every attribute through this variant, so
/// heterogeneous attribute shapes across tenants stay representable without
/// a shared schema. Equality is structural: two values compare equal when
/// their shapes and contents match, never by identity.
///
/// `Number` uses bit-equality so that equality is total (NaN == NaN) and the
/// type can implement `Eq` and `Hash`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Absent or explicitly null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit floating point number. Integers are represented exactly up to
    /// 2^53.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<AttributeValue>),
    /// Nested attribute map.
    Map(BTreeMap<String, AttributeValue>),
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttributeValue::Null, AttributeValue::Null) => true,
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
            // Bit-equality: NaN == NaN, so structural equality stays total.
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.to_bits() == b.to_bits(),
            (AttributeValue::String(a), AttributeValue::String(b)) => a == b,
            (AttributeValue::List(a), AttributeValue::List(b)) => a == b,
            (AttributeValue::Map(a), AttributeValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl std::hash::Hash for AttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttributeValue::Null => {}
            AttributeValue::Bool(v) => v.hash(state),
            AttributeValue::Number(v) => v.to_bits().hash(state),
            AttributeValue::String(v) => v.hash(state),
            AttributeValue::List(v) => v.hash(state),
            AttributeValue::Map(v) => v.hash(state),
        }
    }
}

impl AttributeValue {
    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Returns the value as a bool, if it is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an f64, if it is a `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a slice of values, if it is a `List`.
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the value as a nested map, if it is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            AttributeValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of this value's variant, used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Number(_) => "number",
            AttributeValue::String(_) => "string",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Converts this value to JSON.
    ///
    /// `Number` values that are NaN or infinite become JSON null (JSON has no
    /// representation for them).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Builds a value from JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                n.as_f64().map_or(AttributeValue::Null, AttributeValue::Number)
            }
            serde_json::Value::String(s) => AttributeValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.iter().map(AttributeValue::from_json).collect())
            }
            serde_json::Value::Object(m) => AttributeValue::Map(
                m.iter()
                    .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            AttributeValue::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Number(n as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Number(f64::from(n))
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(items: Vec<AttributeValue>) -> Self {
        AttributeValue::List(items)
    }
}

impl From<Attributes> for AttributeValue {
    fn from(m: Attributes) -> Self {
        AttributeValue::Map(m)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn structural_equality_is_recursive() {
        let a = AttributeValue::Map(attrs(&[
            ("roles", AttributeValue::List(vec!["admin".into(), "editor".into()])),
            ("level", 2.into()),
        ]));
        let b = AttributeValue::Map(attrs(&[
            ("level", 2.into()),
            ("roles", AttributeValue::List(vec!["admin".into(), "editor".into()])),
        ]));
        assert_eq!(a, b);

        let c = AttributeValue::Map(attrs(&[
            ("roles", AttributeValue::List(vec!["admin".into()])),
            ("level", 2.into()),
        ]));
        assert_ne!(a, c);
    }

    #[test]
    fn different_types_are_not_equal() {
        assert_ne!(AttributeValue::from("2"), AttributeValue::from(2i64));
        assert_ne!(AttributeValue::from(true), AttributeValue::from("true"));
        assert_ne!(AttributeValue::Null, AttributeValue::from(0i64));
    }

    #[test]
    fn nan_equals_nan() {
        // Bit-equality keeps structural equality total.
        assert_eq!(
            AttributeValue::Number(f64::NAN),
            AttributeValue::Number(f64::NAN)
        );
    }

    #[test]
    fn json_round_trip() {
        let value = AttributeValue::Map(attrs(&[
            ("name", "alice".into()),
            ("age", 41.into()),
            ("active", true.into()),
            ("teams", AttributeValue::List(vec!["hr".into(), "eng".into()])),
            ("manager", AttributeValue::Null),
        ]));
        let json = value.to_json();
        assert_eq!(AttributeValue::from_json(&json), value);
    }

    #[test]
    fn serde_untagged_matches_json_shape() {
        let value = AttributeValue::List(vec![1i64.into(), "two".into(), false.into()]);
        let text = serde_json::to_string(&value).expect("serialize");
        assert_eq!(text, r#"[1.0,"two",false]"#);

        let parsed: AttributeValue = serde_json::from_str(r#"{"dept":"eng","n":3}"#).expect("parse");
        let expected = AttributeValue::Map(attrs(&[("dept", "eng".into()), ("n", 3.into())]));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn display_renders_nested_values() {
        let value = AttributeValue::Map(attrs(&[
            ("id", "t1".into()),
            ("roles", AttributeValue::List(vec!["a".into(), "b".into()])),
        ]));
        assert_eq!(value.to_string(), "{id: t1, roles: [a, b]}");
    }

    #[test]
    fn accessors_return_none_on_other_variants() {
        let s = AttributeValue::from("x");
        assert_eq!(s.as_str(), Some("x"));
        assert!(s.as_bool().is_none());
        assert!(s.as_number().is_none());
        assert!(s.as_list().is_none());
        assert!(s.as_map().is_none());
        assert_eq!(s.type_name(), "string");
    }
}
