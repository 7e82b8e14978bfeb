//! BSON to JSON conversion.
//!
//! Dates become RFC 3339 strings and ObjectIds plain hex strings, never
//! extended JSON wrapper objects.

use crate::models::RawRecord;
use base64::Engine;
use mongodb::bson::{Bson, Document};
use serde_json::{Number, Value};

/// Converts one document into a sampled record.
pub fn document_to_record(document: &Document) -> RawRecord {
    document
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined | Bson::MinKey | Bson::MaxKey => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::Number((*n).into()),
        Bson::Int64(n) => Value::Number((*n).into()),
        Bson::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::Decimal128(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::String(text), Value::Number)
        }
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map_or_else(|_| Value::Number(dt.timestamp_millis().into()), Value::String),
        Bson::Timestamp(ts) => Value::Number(ts.time.into()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Binary(binary) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(&binary.bytes))
        }
        Bson::RegularExpression(regex) => Value::String(regex.pattern.to_string()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_record(document)),
        _ => Value::Null,
    }
}
