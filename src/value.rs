//! Tagged-variant model for document field values.
//!
//! Source documents have no fixed shape, so every field value is carried as a
//! [`Value`]. Type inference and key derivation are pure functions over this
//! enum rather than ad hoc probing of untyped JSON.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// A document's field map. Ordered so that merges and schemas are deterministic.
pub type Fields = BTreeMap<String, Value>;

/// A single document field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Map(Fields),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render a scalar value as a key string.
    ///
    /// Returns `None` for null, lists and maps, which cannot address a record.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::DateTime(dt) => Some(format_timestamp(dt)),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Short name of the variant, used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Format a timestamp the way it is stored in keys and on the wire.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str(self.kind()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.serialize_str(&format_timestamp(dt)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

// Timestamps arrive as plain strings on the wire; they stay `Value::String`
// and are recognized as date-times by inference.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from(json!(42)), Value::Int(42));
        assert_eq!(Value::from(json!(-7)), Value::Int(-7));
        assert_eq!(Value::from(json!(42.5)), Value::Float(42.5));
    }

    #[test]
    fn test_from_json_nested() {
        let value = Value::from(json!({"a": [1, null], "b": {"c": true}}));
        let Value::Map(fields) = value else {
            panic!("expected map");
        };
        assert_eq!(
            fields["a"],
            Value::List(vec![Value::Int(1), Value::Null])
        );
        assert!(matches!(fields["b"], Value::Map(_)));
    }

    #[test]
    fn test_datetime_serializes_as_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_string(&Value::DateTime(dt)).unwrap();
        assert_eq!(json, "\"2023-05-01T00:00:00.000Z\"");
    }

    #[test]
    fn test_as_key() {
        assert_eq!(Value::from("abc").as_key().as_deref(), Some("abc"));
        assert_eq!(Value::Int(12).as_key().as_deref(), Some("12"));
        assert_eq!(Value::Null.as_key(), None);
        assert_eq!(Value::List(vec![]).as_key(), None);
    }

    #[test]
    fn test_deserialize_roundtrips_through_json() {
        let original = json!({"name": "x", "tags": ["a", "b"], "n": 3});
        let value: Value = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&value).unwrap(), original);
    }
}
