//! Firestore REST API wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Firestore document value types.
///
/// Integers travel as strings on the wire; timestamps are RFC3339 strings.
/// Tags outside the flat type system the application uses (bytes, references,
/// geo points) are modeled so foreign documents still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::StringValue(s.into())
    }

    pub fn integer(i: i64) -> Self {
        Self::IntegerValue(i.to_string())
    }

    pub fn double(f: f64) -> Self {
        Self::DoubleValue(f)
    }

    pub fn boolean(b: bool) -> Self {
        Self::BooleanValue(b)
    }

    pub fn timestamp(t: DateTime<Utc>) -> Self {
        Self::TimestampValue(t.to_rfc3339())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
///
/// A document without a `fields` mapping is treated as non-existent, which is
/// how a GET on a missing path is surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document body with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Placeholder for a document that does not exist on the server.
    pub fn missing() -> Self {
        Self {
            name: None,
            fields: None,
            create_time: None,
            update_time: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    /// Document id: the last segment of the resource name.
    pub fn doc_id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }
}

// ============================================================================
// Structured query types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_descendants: Option<bool>,
}

/// Either a bare field filter or a composite wrapper, never both. The server
/// schema requires the bare form when there is exactly one predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_filter: Option<CompositeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<FieldFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

/// One result envelope from `documents:runQuery`. Envelopes without a
/// document are progress/skipped-result markers and are filtered out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub read_time: Option<String>,
    #[serde(default)]
    pub skipped_results: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_wire_tags() {
        let v = serde_json::to_value(Value::integer(42)).unwrap();
        assert_eq!(v, json!({"integerValue": "42"}));

        let v = serde_json::to_value(Value::string("USDT")).unwrap();
        assert_eq!(v, json!({"stringValue": "USDT"}));

        let v = serde_json::to_value(Value::NullValue(())).unwrap();
        assert_eq!(v, json!({"nullValue": null}));
    }

    #[test]
    fn test_value_roundtrip_through_wire_json() {
        let v = Value::ArrayValue(ArrayValue {
            values: Some(vec![Value::boolean(true), Value::double(1.5)]),
        });
        let wire = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_timestamp_constructor_uses_rfc3339() {
        let t = DateTime::parse_from_rfc3339("2026-02-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let v = serde_json::to_value(Value::timestamp(t)).unwrap();
        assert_eq!(v, json!({"timestampValue": "2026-02-01T10:00:00+00:00"}));
    }

    #[test]
    fn test_document_exists() {
        assert!(!Document::missing().exists());
        assert!(Document::new(HashMap::new()).exists());
    }

    #[test]
    fn test_doc_id_is_last_path_segment() {
        let doc = Document {
            name: Some("projects/p/databases/(default)/documents/payments/abc123".into()),
            fields: None,
            create_time: None,
            update_time: None,
        };
        assert_eq!(doc.doc_id(), Some("abc123"));
    }

    #[test]
    fn test_run_query_envelope_without_document() {
        let envelope: RunQueryResponse =
            serde_json::from_value(json!({"readTime": "2026-01-01T00:00:00Z"})).unwrap();
        assert!(envelope.document.is_none());
    }
}
