//! Target loading strategies.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SyncError;
use crate::values::{SyncValue, TargetRecord};

/// How a batch is written into the target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LoadMode {
    /// Insert every record as a new row.
    Append,
    /// Update rows matching `key`, insert the rest, atomically.
    Merge { key: Vec<String> },
    /// Replace the whole table with the batch, atomically.
    Replace,
}

impl LoadMode {
    pub fn validate(&self) -> Result<(), SyncError> {
        if let LoadMode::Merge { key } = self {
            if key.is_empty() {
                return Err(SyncError::Config("merge mode requires a key".to_string()));
            }
            if let Some(blank) = key.iter().find(|k| k.trim().is_empty()) {
                return Err(SyncError::Config(format!(
                    "merge key contains blank column '{blank}'"
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoadMode::Append => "append",
            LoadMode::Merge { .. } => "merge",
            LoadMode::Replace => "replace",
        }
    }
}

/// A target store that accepts transformed batches.
///
/// `load` returns the number of records written. Merge and replace loads must
/// be all-or-nothing: on error the target is left as it was before the call.
#[async_trait]
pub trait Loader: Send + Sync {
    fn mode(&self) -> &LoadMode;

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError>;
}

#[async_trait]
impl<T: Loader + ?Sized> Loader for &T {
    fn mode(&self) -> &LoadMode {
        (**self).mode()
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        (**self).load(records).await
    }
}

#[async_trait]
impl<T: Loader + ?Sized> Loader for Box<T> {
    fn mode(&self) -> &LoadMode {
        (**self).mode()
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        (**self).load(records).await
    }
}

#[async_trait]
impl<T: Loader + ?Sized> Loader for Arc<T> {
    fn mode(&self) -> &LoadMode {
        (**self).mode()
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        (**self).load(records).await
    }
}

/// Values of the key columns of `record`, in key order.
///
/// A missing or NULL key column is a [`SyncError::Load`].
pub fn key_values(record: &TargetRecord, key: &[String]) -> Result<Vec<SyncValue>, SyncError> {
    key.iter()
        .map(|column| match record.get(column) {
            Some(SyncValue::Null) | None => Err(SyncError::load(format!(
                "record is missing merge key column '{column}'"
            ))),
            Some(value) => Ok(value.clone()),
        })
        .collect()
}

/// Collapse records sharing a key so that the last one wins.
///
/// Each surviving record keeps the position of the first record with its
/// key, which matches applying the batch row by row. Numeric keys compare by
/// value, so `Int(1)`, `Decimal(1.00)` and `Float(1.0)` are the same key.
pub fn dedupe_by_key(
    records: &[TargetRecord],
    key: &[String],
) -> Result<Vec<TargetRecord>, SyncError> {
    let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
    let mut out: Vec<TargetRecord> = Vec::with_capacity(records.len());
    for record in records {
        let identity: Vec<String> = key_values(record, key)?
            .iter()
            .map(key_identity)
            .collect();
        match positions.get(&identity) {
            Some(&index) => out[index] = record.clone(),
            None => {
                positions.insert(identity, out.len());
                out.push(record.clone());
            }
        }
    }
    Ok(out)
}

/// Canonical text of a key value; numbers that are equal render alike.
fn key_identity(value: &SyncValue) -> String {
    let number = match value {
        SyncValue::Int(i) => Some(Decimal::from(*i)),
        SyncValue::Decimal(d) => Some(*d),
        SyncValue::Float(f) => Decimal::from_f64(*f),
        _ => None,
    };
    match number {
        Some(d) => format!("number:{}", d.normalize()),
        None => format!("{}:{}", value.type_name(), value.to_json()),
    }
}
