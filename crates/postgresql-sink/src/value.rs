//! Binding [`SyncValue`]s as statement parameters.
//!
//! The column type is only known once the statement is prepared, so
//! [`PgValue`] accepts every type and converts at bind time.

use bytes::BytesMut;
use chrono::NaiveTime;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::error::Error;
use sync_core::SyncValue;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// A [`SyncValue`] bound to a parameter of any column type.
#[derive(Debug)]
pub struct PgValue<'a>(pub &'a SyncValue);

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if let Kind::Array(_) = ty.kind() {
            return match self.0 {
                SyncValue::Null => Ok(IsNull::Yes),
                SyncValue::Array(items) => {
                    let items: Vec<PgValue<'_>> = items.iter().map(PgValue).collect();
                    items.to_sql(ty, out)
                }
                SyncValue::Json(json @ serde_json::Value::Array(_)) => {
                    PgValue(&SyncValue::from_json(json.clone())).to_sql(ty, out)
                }
                SyncValue::String(text) => match serde_json::from_str(text) {
                    Ok(json @ serde_json::Value::Array(_)) => {
                        PgValue(&SyncValue::from_json(json)).to_sql(ty, out)
                    }
                    _ => Err(mismatch(self.0, ty)),
                },
                other => Err(mismatch(other, ty)),
            };
        }

        match self.0 {
            SyncValue::Null => Ok(IsNull::Yes),
            SyncValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ if is_text(ty) => b.to_string().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::Int(i) => int_to_sql(*i, ty, out),
            SyncValue::Float(f) => match *ty {
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::from_f64(*f)
                    .ok_or_else(|| format!("{f} cannot be stored as numeric"))?
                    .to_sql(ty, out),
                _ if is_text(ty) => f.to_string().to_sql(ty, out),
                _ if is_json(ty) => self.json().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::Decimal(d) => match *ty {
                Type::NUMERIC => d.to_sql(ty, out),
                Type::FLOAT8 => d
                    .to_f64()
                    .ok_or_else(|| format!("{d} out of float8 range"))?
                    .to_sql(ty, out),
                Type::FLOAT4 => d
                    .to_f32()
                    .ok_or_else(|| format!("{d} out of float4 range"))?
                    .to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 if d.fract().is_zero() => {
                    int_to_sql(d.to_i64().ok_or_else(|| format!("{d} out of range"))?, ty, out)
                }
                _ if is_text(ty) => d.to_string().to_sql(ty, out),
                _ if is_json(ty) => self.json().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::String(s) => match *ty {
                _ if is_text(ty) => s.to_sql(ty, out),
                _ if is_json(ty) => serde_json::from_str::<serde_json::Value>(s)
                    .unwrap_or_else(|_| serde_json::Value::String(s.clone()))
                    .to_sql(ty, out),
                Type::TIMESTAMP => bookmark::parse_timestamp(s)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => bookmark::parse_timestamp(s)?.and_utc().to_sql(ty, out),
                Type::DATE => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(s.trim().parse()?, ty, out),
                Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
                Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
                Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => ts.and_utc().to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                _ if is_text(ty) => self.text().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => d.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                _ if is_text(ty) => self.text().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
            SyncValue::Json(_) | SyncValue::Array(_) => match *ty {
                _ if is_json(ty) => self.json().to_sql(ty, out),
                _ if is_text(ty) => self.json().to_string().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

impl PgValue<'_> {
    fn json(&self) -> serde_json::Value {
        self.0.to_json()
    }

    fn text(&self) -> String {
        match self.0.to_json() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT8 => i.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text(ty) => i.to_string().to_sql(ty, out),
        _ if is_json(ty) => serde_json::Value::from(i).to_sql(ty, out),
        _ => Err(format!("cannot store int in a {ty} column").into()),
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

fn is_json(ty: &Type) -> bool {
    matches!(*ty, Type::JSON | Type::JSONB)
}

fn mismatch(value: &SyncValue, ty: &Type) -> BoxError {
    format!("cannot store {} value in a {ty} column", value.type_name()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &SyncValue, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut buf = BytesMut::new();
        match PgValue(value).to_sql_checked(ty, &mut buf)? {
            IsNull::Yes => Ok(Vec::new()),
            IsNull::No => Ok(buf.to_vec()),
        }
    }

    #[test]
    fn test_int_widths() {
        assert_eq!(
            encode(&SyncValue::Int(1), &Type::INT4).unwrap(),
            vec![0, 0, 0, 1]
        );
        assert_eq!(encode(&SyncValue::Int(1), &Type::INT2).unwrap(), vec![0, 1]);
        assert!(encode(&SyncValue::Int(1 << 40), &Type::INT4).is_err());
    }

    #[test]
    fn test_null_is_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            PgValue(&SyncValue::Null)
                .to_sql_checked(&Type::TIMESTAMP, &mut buf)
                .unwrap(),
            IsNull::Yes
        ));
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(
            encode(&SyncValue::from("abc"), &Type::TEXT).unwrap(),
            b"abc".to_vec()
        );
        assert_eq!(
            encode(&SyncValue::Int(42), &Type::VARCHAR).unwrap(),
            b"42".to_vec()
        );
    }

    #[test]
    fn test_arrays_from_json() {
        let native = encode(
            &SyncValue::Array(vec![SyncValue::from("a"), SyncValue::from("b")]),
            &Type::TEXT_ARRAY,
        )
        .unwrap();
        assert_eq!(
            encode(&SyncValue::Json(serde_json::json!(["a", "b"])), &Type::TEXT_ARRAY).unwrap(),
            native
        );
        assert_eq!(
            encode(&SyncValue::from(r#"["a","b"]"#), &Type::TEXT_ARRAY).unwrap(),
            native
        );
        assert!(encode(&SyncValue::Json(serde_json::json!([1, 2])), &Type::INT8_ARRAY).is_ok());
        assert!(encode(&SyncValue::Json(serde_json::json!({"a": 1})), &Type::TEXT_ARRAY).is_err());
        assert!(encode(&SyncValue::from("a,b"), &Type::TEXT_ARRAY).is_err());
    }

    #[test]
    fn test_mismatch_is_error() {
        assert!(encode(&SyncValue::Bool(true), &Type::TIMESTAMP).is_err());
        assert!(encode(&SyncValue::from("nope"), &Type::INT8).is_err());
    }
}
