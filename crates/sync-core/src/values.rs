//! Value representations flowing through a sync run.
//!
//! Sources produce [`Record`]s (ordered columns, as returned by the query),
//! the transformer produces [`TargetRecord`]s (named fields), and loaders
//! convert [`SyncValue`]s into their store's native types.

use anyhow::Context;
use bookmark::{parse_timestamp, Watermark, WatermarkKind, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric with scale (e.g. `NUMBER(38,2)`)
    Decimal(Decimal),
    String(String),
    /// Timezone-naive date-time
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    /// Semi-structured value (VARIANT, OBJECT, jsonb)
    Json(serde_json::Value),
    Array(Vec<SyncValue>),
}

impl SyncValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Json(_) => "json",
            Self::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Read this value as a watermark of the given kind.
    ///
    /// Returns `Ok(None)` for NULL. Integer watermarks accept ints, whole
    /// decimals and numeric strings; timestamp watermarks accept timestamps,
    /// dates (midnight) and timestamp strings.
    pub fn as_watermark(&self, kind: WatermarkKind) -> anyhow::Result<Option<Watermark>> {
        if self.is_null() {
            return Ok(None);
        }
        let watermark = match (kind, self) {
            (WatermarkKind::Int, Self::String(s)) => Watermark::parse(kind, s)?,
            (WatermarkKind::Int, Self::Float(f)) if f.fract() == 0.0 => {
                // i64::MAX as f64 rounds up to 2^63, which is out of range.
                if *f < i64::MIN as f64 || *f >= i64::MAX as f64 {
                    anyhow::bail!("float value {f} is out of range for an int watermark");
                }
                Watermark::Int(*f as i64)
            }
            (WatermarkKind::Int, other) => Watermark::Int(other.as_i64().with_context(|| {
                format!("{} value {other:?} is not an int watermark", other.type_name())
            })?),
            (WatermarkKind::Timestamp, Self::Timestamp(ts)) => Watermark::Timestamp(*ts),
            (WatermarkKind::Timestamp, Self::Date(d)) => {
                Watermark::Timestamp(d.and_time(NaiveTime::MIN))
            }
            (WatermarkKind::Timestamp, Self::String(s)) => Watermark::Timestamp(parse_timestamp(s)?),
            (WatermarkKind::Timestamp, other) => {
                anyhow::bail!(
                    "{} value {other:?} is not a timestamp watermark",
                    other.type_name()
                )
            }
        };
        Ok(Some(watermark))
    }

    /// Convert a JSON value, mapping scalars and arrays onto their own
    /// variants. Objects stay JSON.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            object @ Value::Object(_) => Self::Json(object),
        }
    }

    /// JSON rendering used by document targets and logs.
    ///
    /// Decimals become floats and timestamps use the bookmark text format.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(d.to_string())),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Json(v) => v.clone(),
            Self::Array(items) => Value::Array(items.iter().map(SyncValue::to_json).collect()),
        }
    }
}

impl From<bool> for SyncValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SyncValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SyncValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for SyncValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SyncValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SyncValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDateTime> for SyncValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Decimal> for SyncValue {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<serde_json::Value> for SyncValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<SyncValue>> From<Option<T>> for SyncValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SyncValue::Null)
    }
}

/// A source row: columns in the order the query returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, SyncValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column to the row.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SyncValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SyncValue>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Get a column value by exact name.
    pub fn get(&self, name: &str) -> Option<&SyncValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Get a column value by exact name, falling back to an ASCII
    /// case-insensitive match.
    pub fn get_ignore_case(&self, name: &str) -> Option<&SyncValue> {
        self.get(name).or_else(|| {
            self.columns
                .iter()
                .find(|(column, _)| column.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SyncValue)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<SyncValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, SyncValue);
    type IntoIter = std::vec::IntoIter<(String, SyncValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// A transformed row keyed by target field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRecord {
    fields: BTreeMap<String, SyncValue>,
}

impl TargetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<SyncValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<SyncValue>,
    ) -> Option<SyncValue> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&SyncValue> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut SyncValue> {
        self.fields.get_mut(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SyncValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields(&self) -> &BTreeMap<String, SyncValue> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON object of all fields.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<SyncValue>> FromIterator<(K, V)> for TargetRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_record_lookup() {
        let record = Record::new().with("ID", 1i64).with("Name", "a");
        assert_eq!(record.get("ID"), Some(&SyncValue::Int(1)));
        assert_eq!(record.get("id"), None);
        assert_eq!(record.get_ignore_case("id"), Some(&SyncValue::Int(1)));
        assert_eq!(record.get_ignore_case("NAME"), Some(&SyncValue::from("a")));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_int_watermark_conversions() {
        let kind = WatermarkKind::Int;
        assert_eq!(
            SyncValue::Int(5).as_watermark(kind).unwrap(),
            Some(Watermark::Int(5))
        );
        assert_eq!(
            SyncValue::Decimal(Decimal::from_str("12").unwrap())
                .as_watermark(kind)
                .unwrap(),
            Some(Watermark::Int(12))
        );
        assert_eq!(
            SyncValue::from("42").as_watermark(kind).unwrap(),
            Some(Watermark::Int(42))
        );
        assert_eq!(SyncValue::Null.as_watermark(kind).unwrap(), None);
        assert!(SyncValue::Decimal(Decimal::from_str("1.5").unwrap())
            .as_watermark(kind)
            .is_err());
        assert!(SyncValue::Bool(true).as_watermark(kind).is_err());
    }

    #[test]
    fn test_float_watermark_range() {
        let kind = WatermarkKind::Int;
        assert_eq!(
            SyncValue::Float(1e15).as_watermark(kind).unwrap(),
            Some(Watermark::Int(1_000_000_000_000_000))
        );
        assert!(SyncValue::Float(1e19).as_watermark(kind).is_err());
        assert!(SyncValue::Float(-1e19).as_watermark(kind).is_err());
        assert!(SyncValue::Float(9_223_372_036_854_775_807.0)
            .as_watermark(kind)
            .is_err());
    }

    #[test]
    fn test_from_json() {
        let value = SyncValue::from_json(serde_json::json!(["a", 1, 1.5, null, [true], {"k": 1}]));
        assert_eq!(
            value,
            SyncValue::Array(vec![
                SyncValue::from("a"),
                SyncValue::Int(1),
                SyncValue::Float(1.5),
                SyncValue::Null,
                SyncValue::Array(vec![SyncValue::Bool(true)]),
                SyncValue::Json(serde_json::json!({"k": 1})),
            ])
        );
    }

    #[test]
    fn test_timestamp_watermark_conversions() {
        let kind = WatermarkKind::Timestamp;
        assert_eq!(
            SyncValue::Timestamp(ts("2024-01-01 10:00:00"))
                .as_watermark(kind)
                .unwrap(),
            Some(Watermark::Timestamp(ts("2024-01-01 10:00:00")))
        );
        assert_eq!(
            SyncValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                .as_watermark(kind)
                .unwrap(),
            Some(Watermark::Timestamp(ts("2024-01-01 00:00:00")))
        );
        assert!(SyncValue::Int(1).as_watermark(kind).is_err());
    }

    #[test]
    fn test_to_json() {
        let record = TargetRecord::new()
            .with("id", 1i64)
            .with("price", Decimal::from_str("2.50").unwrap())
            .with("at", ts("2024-01-01 00:00:00"))
            .with("missing", SyncValue::Null);
        assert_eq!(
            record.to_json(),
            serde_json::json!({
                "id": 1,
                "price": 2.5,
                "at": "2024-01-01 00:00:00",
                "missing": null
            })
        );
    }
}
