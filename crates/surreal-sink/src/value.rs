//! [`SyncValue`] to SurrealDB value conversion.

use std::collections::BTreeMap;
use surrealdb::sql::{Array, Datetime, Number, Object, Strand, Value};
use sync_core::{SyncValue, TargetRecord};

/// Convert one field value.
///
/// Timestamps are naive in the engine and are stored as UTC datetimes.
/// Dates have no native type and are stored as `YYYY-MM-DD` strings.
pub fn to_surreal(value: &SyncValue) -> Value {
    match value {
        SyncValue::Null => Value::Null,
        SyncValue::Bool(b) => Value::Bool(*b),
        SyncValue::Int(i) => Value::Number(Number::Int(*i)),
        SyncValue::Float(f) => Value::Number(Number::Float(*f)),
        SyncValue::Decimal(d) => Value::Number(Number::Decimal(*d)),
        SyncValue::String(s) => Value::Strand(Strand::from(s.clone())),
        SyncValue::Timestamp(ts) => Value::Datetime(Datetime::from(ts.and_utc())),
        SyncValue::Date(d) => Value::Strand(Strand::from(d.format("%Y-%m-%d").to_string())),
        SyncValue::Json(json) => json_to_surreal(json),
        SyncValue::Array(items) => {
            Value::Array(Array::from(items.iter().map(to_surreal).collect::<Vec<_>>()))
        }
    }
}

fn json_to_surreal(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(Number::Int(i))
            } else if let Some(f) = n.as_f64() {
                Value::Number(Number::Float(f))
            } else {
                Value::Null
            }
        }
        serde_json::Value::String(s) => Value::Strand(Strand::from(s.clone())),
        serde_json::Value::Array(arr) => Value::Array(Array::from(
            arr.iter().map(json_to_surreal).collect::<Vec<_>>(),
        )),
        serde_json::Value::Object(map) => {
            let obj: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_surreal(v)))
                .collect();
            Value::Object(Object::from(obj))
        }
    }
}

/// Convert a whole record into document content.
pub fn record_to_object(record: &TargetRecord) -> Object {
    let fields: BTreeMap<String, Value> = record
        .iter()
        .map(|(field, value)| (field.to_string(), to_surreal(value)))
        .collect();
    Object::from(fields)
}

/// The record id part derived from a merge key.
///
/// A single-column key maps to a scalar id, a composite key to an array id
/// in key order.
pub fn key_to_id(values: &[SyncValue]) -> Value {
    match values {
        [single] => to_surreal(single),
        _ => Value::Array(Array::from(values.iter().map(to_surreal).collect::<Vec<_>>())),
    }
}
