// Document model - field map, reserved metadata fields, text rendering

use crate::error::{BaseDbError, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// A schema-less document: an ordered map from field name to JSON value.
/// Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Document(Map::new())
    }

    /// Build a document from an arbitrary JSON value. Only objects are documents.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document(fields)),
            other => Err(BaseDbError::BadRequest(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID_FIELD)
    }

    /// The document ID when it is stored as text.
    pub fn id_str(&self) -> Option<&str> {
        self.id().and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Generate `id` and `created_at` when absent and always set `updated_at`.
    pub fn stamp_at(&mut self, now: &str) {
        if !self.contains(ID_FIELD) {
            self.insert(ID_FIELD, new_id());
        }
        if !self.contains(CREATED_AT_FIELD) {
            self.insert(CREATED_AT_FIELD, now);
        }
        self.insert(UPDATED_AT_FIELD, now);
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Document(fields)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

/// Current UTC time as an RFC3339 string with second precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a new collision-resistant document ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Render a value to the text form used by equality, membership and
/// pattern matching. Integral floats render as plain integers at any
/// magnitude, so `5`, `5.0` and `"5"` all compare equal, as do `1e15` and
/// `1000000000000000`.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Interpret a value as a number: JSON numbers, or text that parses as a
/// float exactly as given (surrounding whitespace makes it text).
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_generates_metadata() {
        let mut doc = Document::from_value(json!({ "name": "Alice" })).unwrap();
        doc.stamp_at("2026-02-13T10:00:00Z");

        assert!(!doc.id_str().unwrap().is_empty());
        assert_eq!(doc.get(CREATED_AT_FIELD), Some(&json!("2026-02-13T10:00:00Z")));
        assert_eq!(doc.get(UPDATED_AT_FIELD), Some(&json!("2026-02-13T10:00:00Z")));
    }

    #[test]
    fn test_stamp_keeps_existing_id_and_created_at() {
        let mut doc = Document::from_value(json!({
            "id": "custom",
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": "2020-01-01T00:00:00Z"
        }))
        .unwrap();
        doc.stamp_at("2026-02-13T10:00:00Z");

        assert_eq!(doc.id_str(), Some("custom"));
        assert_eq!(doc.get(CREATED_AT_FIELD), Some(&json!("2020-01-01T00:00:00Z")));
        assert_eq!(doc.get(UPDATED_AT_FIELD), Some(&json!("2026-02-13T10:00:00Z")));
    }

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("text")).is_err());
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!(5)), "5");
        assert_eq!(render(&json!(5.0)), "5");
        assert_eq!(render(&json!(5.5)), "5.5");
        assert_eq!(render(&json!("5")), "5");
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&Value::Null), "null");
        assert_eq!(render(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn test_render_large_integral_floats() {
        assert_eq!(render(&json!(1e15)), "1000000000000000");
        assert_eq!(render(&json!(1e15)), render(&json!(1_000_000_000_000_000_u64)));
        assert_eq!(render(&json!(-2.5e16)), "-25000000000000000");
        assert_eq!(render(&json!(1e20)), "100000000000000000000");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(18)), Some(18.0));
        assert_eq!(as_number(&json!("2.5")), Some(2.5));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(as_number(&json!(true)), None);
        assert_eq!(as_number(&json!(" 5")), None);
        assert_eq!(as_number(&json!("5 ")), None);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
