//! Decoding of JSON result cells by Snowflake column type.
//!
//! In JSON result format every non-NULL cell is a string; its meaning comes
//! from the column's `rowtype` entry.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::SyncValue;

/// Column metadata needed to decode a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub name: String,
    /// Lower-case Snowflake type, e.g. `fixed`, `text`, `timestamp_ntz`.
    pub kind: String,
    pub scale: Option<i64>,
}

/// Decode one cell.
pub fn decode_cell(column: &ColumnType, cell: Option<&str>) -> anyhow::Result<SyncValue> {
    let Some(raw) = cell else {
        return Ok(SyncValue::Null);
    };
    let value = match column.kind.as_str() {
        "fixed" => decode_fixed(raw, column.scale.unwrap_or(0))?,
        "real" => SyncValue::Float(
            raw.parse::<f64>()
                .with_context(|| format!("Invalid REAL '{raw}'"))?,
        ),
        "boolean" => SyncValue::Bool(matches!(raw, "1" | "true" | "TRUE" | "True")),
        "date" => {
            let days: i64 = raw
                .parse()
                .with_context(|| format!("Invalid DATE '{raw}'"))?;
            SyncValue::Date(
                NaiveDate::from_ymd_opt(1970, 1, 1)
                    .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days)))
                    .with_context(|| format!("DATE out of range: {days} days"))?,
            )
        }
        "timestamp_ntz" | "timestamp_ltz" => SyncValue::Timestamp(epoch_to_naive(raw)?),
        "timestamp_tz" => {
            // "<epoch seconds> <offset minutes + 1440>"; the epoch part is UTC
            let epoch = raw.split_whitespace().next().unwrap_or(raw);
            SyncValue::Timestamp(epoch_to_naive(epoch)?)
        }
        "variant" | "object" | "array" => match serde_json::from_str(raw) {
            Ok(json) => SyncValue::Json(json),
            Err(_) => SyncValue::String(raw.to_string()),
        },
        _ => SyncValue::String(raw.to_string()),
    };
    Ok(value)
}

fn decode_fixed(raw: &str, scale: i64) -> anyhow::Result<SyncValue> {
    if scale == 0 {
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(SyncValue::Int(i));
        }
    }
    Decimal::from_str(raw)
        .map(SyncValue::Decimal)
        .with_context(|| format!("Invalid NUMBER '{raw}'"))
}

/// `"1700000000.123456789"` → naive date-time.
fn epoch_to_naive(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let value = Decimal::from_str(raw).with_context(|| format!("Invalid timestamp '{raw}'"))?;
    let secs = value.floor();
    let nanos = ((value - secs) * Decimal::from(1_000_000_000u32))
        .round()
        .to_u32()
        .unwrap_or(0);
    let secs = secs
        .to_i64()
        .with_context(|| format!("Timestamp out of range '{raw}'"))?;
    DateTime::from_timestamp(secs, nanos)
        .map(|ts| ts.naive_utc())
        .with_context(|| format!("Timestamp out of range '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            name: "C".to_string(),
            kind: kind.to_string(),
            scale,
        }
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_null() {
        assert_eq!(
            decode_cell(&column("fixed", Some(0)), None).unwrap(),
            SyncValue::Null
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            decode_cell(&column("fixed", Some(0)), Some("42")).unwrap(),
            SyncValue::Int(42)
        );
        assert_eq!(
            decode_cell(&column("fixed", Some(2)), Some("12.50")).unwrap(),
            SyncValue::Decimal(Decimal::from_str("12.50").unwrap())
        );
        assert_eq!(
            decode_cell(&column("fixed", Some(0)), Some("99999999999999999999")).unwrap(),
            SyncValue::Decimal(Decimal::from_str("99999999999999999999").unwrap())
        );
        assert_eq!(
            decode_cell(&column("real", None), Some("1.5")).unwrap(),
            SyncValue::Float(1.5)
        );
        assert!(decode_cell(&column("fixed", Some(0)), Some("abc")).is_err());
    }

    #[test]
    fn test_dates_and_timestamps() {
        assert_eq!(
            decode_cell(&column("date", None), Some("19723")).unwrap(),
            SyncValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            decode_cell(&column("timestamp_ntz", Some(9)), Some("1704067200.250000000")).unwrap(),
            SyncValue::Timestamp(ts("2024-01-01 00:00:00.250"))
        );
        assert_eq!(
            decode_cell(&column("timestamp_tz", Some(9)), Some("1704067200.000000000 1500")).unwrap(),
            SyncValue::Timestamp(ts("2024-01-01 00:00:00"))
        );
        assert_eq!(
            decode_cell(&column("timestamp_ntz", Some(9)), Some("-1.500000000")).unwrap(),
            SyncValue::Timestamp(ts("1969-12-31 23:59:58.500"))
        );
    }

    #[test]
    fn test_semi_structured_and_text() {
        assert_eq!(
            decode_cell(&column("variant", None), Some("{\n  \"a\": 1\n}")).unwrap(),
            SyncValue::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            decode_cell(&column("text", None), Some("hello")).unwrap(),
            SyncValue::String("hello".to_string())
        );
        assert_eq!(
            decode_cell(&column("boolean", None), Some("1")).unwrap(),
            SyncValue::Bool(true)
        );
    }
}
