//! Conversion between plain JSON values and the Firestore wire format.
//!
//! Route handlers deal in untyped JSON bodies, so the codec is total in both
//! directions: encoding never fails, and decoding maps tags outside the
//! supported set to JSON null instead of erroring.

use std::collections::HashMap;

use serde_json::{Map, Number, Value as Json};

use crate::types::{ArrayValue, Document, MapValue, Value};

/// Encode a native JSON value into a Firestore value.
///
/// Numbers without a fractional component become `integerValue` (Firestore
/// carries integers as strings); everything else with a fraction becomes
/// `doubleValue`. This means an integral double such as `42.0` comes back
/// from [`decode`] as the integer `42`.
pub fn encode(value: &Json) -> Value {
    match value {
        Json::Null => Value::NullValue(()),
        Json::Bool(b) => Value::BooleanValue(*b),
        Json::Number(n) => encode_number(n),
        Json::String(s) => Value::StringValue(s.clone()),
        Json::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.iter().map(encode).collect()),
        }),
        Json::Object(map) => Value::MapValue(MapValue {
            fields: Some(map.iter().map(|(k, v)| (k.clone(), encode(v))).collect()),
        }),
    }
}

fn encode_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::IntegerValue(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Value::IntegerValue(u.to_string());
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Value::IntegerValue((f as i64).to_string())
    } else {
        Value::DoubleValue(f)
    }
}

/// Decode a Firestore value back into native JSON.
///
/// Total over every wire tag: timestamps decode to their RFC3339 string,
/// unsupported tags (bytes, references, geo points) decode to null.
pub fn decode(value: &Value) -> Json {
    match value {
        Value::NullValue(()) => Json::Null,
        Value::BooleanValue(b) => Json::Bool(*b),
        Value::IntegerValue(s) => s.parse::<i64>().map(Json::from).unwrap_or(Json::Null),
        Value::DoubleValue(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::StringValue(s) | Value::TimestampValue(s) => Json::String(s.clone()),
        Value::ArrayValue(array) => Json::Array(
            array
                .values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(decode)
                .collect(),
        ),
        Value::MapValue(map) => {
            let mut out = Map::new();
            if let Some(fields) = &map.fields {
                for (key, nested) in fields {
                    out.insert(key.clone(), decode(nested));
                }
            }
            Json::Object(out)
        }
        Value::BytesValue(_) | Value::ReferenceValue(_) | Value::GeoPointValue(_) => Json::Null,
    }
}

/// Encode a JSON object into a document field mapping.
pub fn encode_document(fields: &Map<String, Json>) -> HashMap<String, Value> {
    fields.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decode a document's fields into a JSON object. Missing fields (a document
/// that does not exist) decode to an empty object.
pub fn decode_document(doc: &Document) -> Map<String, Json> {
    let mut out = Map::new();
    if let Some(fields) = &doc.fields {
        for (key, value) in fields {
            out.insert(key.clone(), decode(value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: Json) {
        assert_eq!(decode(&encode(&value)), value);
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(json!(null));
        roundtrip(json!(true));
        roundtrip(json!(false));
        roundtrip(json!(42));
        roundtrip(json!(-7));
        roundtrip(json!(2.5));
        roundtrip(json!("hello"));
        roundtrip(json!(""));
    }

    #[test]
    fn test_roundtrip_nested() {
        roundtrip(json!(["a", 1, null, [true]]));
        roundtrip(json!({"outer": {"inner": [1, 2, 3]}, "flag": false}));
    }

    #[test]
    fn test_integral_double_collapses_to_integer() {
        // 42.0 has no fractional component, so it travels as integerValue
        // and comes back as the integer 42.
        let encoded = encode(&json!(42.0));
        assert_eq!(encoded, Value::IntegerValue("42".to_string()));
        assert_eq!(decode(&encoded), json!(42));
    }

    #[test]
    fn test_fractional_double_stays_double() {
        assert_eq!(encode(&json!(0.25)), Value::DoubleValue(0.25));
    }

    #[test]
    fn test_large_u64_is_integer() {
        let big = u64::MAX;
        assert_eq!(encode(&json!(big)), Value::IntegerValue(big.to_string()));
    }

    #[test]
    fn test_unsupported_tags_decode_to_null() {
        assert_eq!(decode(&Value::BytesValue("AAEC".into())), json!(null));
        assert_eq!(decode(&Value::ReferenceValue("projects/p".into())), json!(null));
    }

    #[test]
    fn test_unparsable_integer_decodes_to_null() {
        assert_eq!(decode(&Value::IntegerValue("not-a-number".into())), json!(null));
    }

    #[test]
    fn test_timestamp_decodes_to_string() {
        let v = Value::TimestampValue("2026-02-01T10:00:00Z".into());
        assert_eq!(decode(&v), json!("2026-02-01T10:00:00Z"));
    }

    #[test]
    fn test_payment_document_wire_shape() {
        let native = json!({
            "amount": 42,
            "currency": "USDT",
            "tags": ["a", "b"],
        });
        let Json::Object(map) = &native else {
            panic!("expected object")
        };

        let fields = encode_document(map);
        let wire = serde_json::to_value(&fields).unwrap();
        assert_eq!(wire["amount"], json!({"integerValue": "42"}));
        assert_eq!(wire["currency"], json!({"stringValue": "USDT"}));
        assert_eq!(
            wire["tags"],
            json!({"arrayValue": {"values": [
                {"stringValue": "a"},
                {"stringValue": "b"},
            ]}})
        );

        let doc = Document::new(fields);
        assert_eq!(Json::Object(decode_document(&doc)), native);
    }
}
