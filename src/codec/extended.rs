//! Extended JSON rendering.
//!
//! Converts a [`Document`] tree into a `serde_json::Value` using the
//! extended JSON conventions (`$oid`, `$date`, `$numberLong`, …), so types
//! that exceed JSON's native precision keep explicit markers instead of
//! silently degrading. Used by the `Display` impl on [`Document`] and by
//! diagnostic callers that want a readable dump of a reply.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value as Json};

use crate::codec::{Document, Value};

/// Render a document as extended JSON.
pub fn document_to_json(doc: &Document) -> Json {
    let mut map = Map::with_capacity(doc.len());
    for (key, value) in doc.iter() {
        map.insert(key.to_string(), value_to_json(value));
    }
    Json::Object(map)
}

/// Render a single value as extended JSON.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Double(v) if v.is_nan() => json!({ "$numberDouble": "NaN" }),
        Value::Double(v) if v.is_infinite() => {
            let rendered = if *v > 0.0 { "Infinity" } else { "-Infinity" };
            json!({ "$numberDouble": rendered })
        }
        Value::Double(v) => json!(v),
        Value::String(s) => json!(s),
        Value::Document(d) => document_to_json(d),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Binary(b) => json!({
            "$binary": {
                "base64": BASE64.encode(&b.bytes),
                "subType": format!("{:02x}", b.subtype),
            }
        }),
        Value::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        Value::Boolean(v) => json!(v),
        Value::DateTime(millis) => json!({ "$date": { "$numberLong": millis.to_string() } }),
        Value::Null => Json::Null,
        Value::Regex(r) => json!({
            "$regularExpression": { "pattern": r.pattern, "options": r.options }
        }),
        Value::Int32(v) => json!(v),
        Value::Timestamp(t) => json!({ "$timestamp": { "t": t.time, "i": t.increment } }),
        Value::Int64(v) => json!({ "$numberLong": v.to_string() }),
        Value::Decimal128(d) => json!({ "$numberDecimal": d.to_string() }),
        Value::MinKey => json!({ "$minKey": 1 }),
        Value::MaxKey => json!({ "$maxKey": 1 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Binary, Decimal128, ObjectId, Regex, Timestamp};
    use crate::doc;

    #[test]
    fn test_plain_scalars_stay_native() {
        let doc = doc! { "name" => "ada", "age" => 36i32, "ok" => 1.0, "flag" => true };
        let json = document_to_json(&doc);
        assert_eq!(json, json!({ "name": "ada", "age": 36, "ok": 1.0, "flag": true }));
    }

    #[test]
    fn test_int64_keeps_precision_marker() {
        let doc = doc! { "size" => 9_007_199_254_740_993i64 };
        let json = document_to_json(&doc);
        assert_eq!(json, json!({ "size": { "$numberLong": "9007199254740993" } }));
    }

    #[test]
    fn test_object_id_and_date() {
        let oid = ObjectId::from_bytes([
            0x50, 0x7f, 0x1f, 0x77, 0xbc, 0xf8, 0x6c, 0xd7, 0x99, 0x43, 0x90, 0x11,
        ]);
        let doc = doc! { "_id" => oid, "created" => Value::DateTime(1_565_546_054_692) };
        let json = document_to_json(&doc);
        assert_eq!(
            json,
            json!({
                "_id": { "$oid": "507f1f77bcf86cd799439011" },
                "created": { "$date": { "$numberLong": "1565546054692" } },
            })
        );
    }

    #[test]
    fn test_binary_is_base64_with_hex_subtype() {
        let doc = doc! { "blob" => Binary { subtype: 0x80, bytes: vec![1, 2, 3, 4] } };
        let json = document_to_json(&doc);
        assert_eq!(
            json,
            json!({ "blob": { "$binary": { "base64": "AQIDBA==", "subType": "80" } } })
        );
    }

    #[test]
    fn test_regex_timestamp_and_keys() {
        let doc = doc! {
            "re" => Regex { pattern: "^a".to_string(), options: "im".to_string() },
            "ts" => Timestamp { time: 100, increment: 2 },
            "lo" => Value::MinKey,
            "hi" => Value::MaxKey,
        };
        let json = document_to_json(&doc);
        assert_eq!(
            json,
            json!({
                "re": { "$regularExpression": { "pattern": "^a", "options": "im" } },
                "ts": { "$timestamp": { "t": 100, "i": 2 } },
                "lo": { "$minKey": 1 },
                "hi": { "$maxKey": 1 },
            })
        );
    }

    #[test]
    fn test_decimal_renders_string_form() {
        let doc = doc! { "price" => Decimal128::from_parts(false, -2, 1999) };
        let json = document_to_json(&doc);
        assert_eq!(json, json!({ "price": { "$numberDecimal": "19.99" } }));
    }

    #[test]
    fn test_non_finite_doubles() {
        let doc = doc! { "nan" => f64::NAN, "inf" => f64::INFINITY, "ninf" => f64::NEG_INFINITY };
        let json = document_to_json(&doc);
        assert_eq!(
            json,
            json!({
                "nan": { "$numberDouble": "NaN" },
                "inf": { "$numberDouble": "Infinity" },
                "ninf": { "$numberDouble": "-Infinity" },
            })
        );
    }

    #[test]
    fn test_nested_structures() {
        let doc = doc! {
            "outer" => doc! { "inner" => vec![Value::Null, Value::from(1i32)] },
        };
        let json = document_to_json(&doc);
        assert_eq!(json, json!({ "outer": { "inner": [null, 1] } }));
    }

    #[test]
    fn test_display_uses_extended_json() {
        let doc = doc! { "n" => 5i32, "ok" => 1.0 };
        assert_eq!(doc.to_string(), r#"{"n":5,"ok":1.0}"#);
    }
}
