//! Row to JSON conversion.
//!
//! Types are tried in order of likelihood. Temporal columns become RFC 3339
//! strings (the session runs in UTC) and binary columns base64 strings, so
//! the sampler sees the same representation every connector produces.
//! DECIMAL has no lossless Rust counterpart in our stack and is read from its
//! text form into a JSON number.

use crate::models::RawRecord;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlColumn, MySqlRow};
use sqlx::{Column, Row, TypeInfo};

pub(super) fn row_to_record(row: &MySqlRow) -> RawRecord {
    let mut record = RawRecord::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), column_value(row, column));
    }
    record
}

fn column_value(row: &MySqlRow, column: &MySqlColumn) -> Value {
    if column.type_info().name() == "DECIMAL" {
        return decimal_value(row, column.name());
    }

    let column = column.name();
    if let Ok(v) = row.try_get::<Option<String>, _>(column) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(column) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(column) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(column) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(column) {
        return v.map(|t| Value::String(t.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(column) {
        return v
            .map(|t| Value::String(t.and_utc().to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(column) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(column) {
        return v
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(column) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(column) {
        return v
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .unwrap_or(Value::Null);
    }

    tracing::debug!(column, "Unsupported column type, sampled as null");
    Value::Null
}

fn decimal_value(row: &MySqlRow, column: &str) -> Value {
    match row.try_get_unchecked::<Option<String>, _>(column) {
        Ok(Some(text)) => decimal_from_text(text),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::debug!(column, error = %e, "Undecodable DECIMAL, sampled as null");
            Value::Null
        }
    }
}

fn decimal_from_text(text: String) -> Value {
    text.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_text_becomes_number() {
        assert_eq!(decimal_from_text("10.50".to_string()), json!(10.5));
        assert_eq!(decimal_from_text("-3".to_string()), json!(-3));
        assert_eq!(decimal_from_text("0.000".to_string()), json!(0.0));
    }

    #[test]
    fn test_unparseable_decimal_text_kept_as_string() {
        assert_eq!(decimal_from_text("NaN".to_string()), json!("NaN"));
    }
}
