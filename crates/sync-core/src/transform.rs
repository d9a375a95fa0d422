//! Source-to-target row mapping.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::TransformError;
use crate::values::{Record, SyncValue, TargetRecord};

/// How source column names become target field names when no explicit rule
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFormat {
    /// Use the column name as-is.
    Preserve,
    /// Lower-case the column name.
    Lower,
    /// `UPDATED_AT` → `updatedAt`.
    Camel,
}

impl ColumnFormat {
    pub fn apply(&self, column: &str) -> String {
        match self {
            ColumnFormat::Preserve => column.to_string(),
            ColumnFormat::Lower => column.to_lowercase(),
            ColumnFormat::Camel => camel_case(column),
        }
    }
}

/// Numeric expiry field written on every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtlConfig {
    #[serde(default = "default_ttl_field")]
    pub field: String,
    pub value: f64,
}

fn default_ttl_field() -> String {
    "_ttl".to_string()
}

/// Per-stream mapping rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Fallback naming for columns without an explicit rule.
    pub format: Option<ColumnFormat>,
    /// Explicit renames: source column → target field.
    pub columns: BTreeMap<String, String>,
    /// Source columns to leave out.
    pub drop: Vec<String>,
    /// If set, every produced field must be one of these.
    pub target_fields: Option<Vec<String>>,
    /// Target fields whose string content is parsed as JSON.
    pub json_fields: Vec<String>,
    /// Target fields holding a JSON array (as text or semi-structured), to
    /// be written as native arrays.
    pub array_fields: Vec<String>,
    /// Field set to the run's timestamp on every record.
    pub stamp_field: Option<String>,
    pub ttl: Option<TtlConfig>,
}

/// Applies a [`TransformConfig`] to source records.
///
/// Rules, in order: explicit rename or drop, then the column format, else the
/// column is unmapped and the record is rejected.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    config: TransformConfig,
    stamp: Option<NaiveDateTime>,
}

impl RowTransformer {
    pub fn new(config: TransformConfig) -> Self {
        Self {
            config,
            stamp: None,
        }
    }

    /// Fix the value written to `stamp_field` (one value per run).
    pub fn with_stamp(mut self, stamp: NaiveDateTime) -> Self {
        self.stamp = Some(stamp);
        self
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Target field for a source column, `Ok(None)` if the column is dropped.
    pub fn target_field(&self, column: &str) -> Result<Option<String>, TransformError> {
        if let Some(field) = lookup(&self.config.columns, column) {
            return Ok(Some(field.clone()));
        }
        if self
            .config
            .drop
            .iter()
            .any(|d| d == column || d.eq_ignore_ascii_case(column))
        {
            return Ok(None);
        }
        match self.config.format {
            Some(format) => Ok(Some(format.apply(column))),
            None => Err(TransformError::UnmappedColumn {
                column: column.to_string(),
            }),
        }
    }

    pub fn transform(&self, record: &Record) -> Result<TargetRecord, TransformError> {
        let mut out = TargetRecord::new();
        let mut sources: HashMap<String, &str> = HashMap::new();

        for (column, value) in record.iter() {
            let Some(field) = self.target_field(column)? else {
                continue;
            };
            if let Some(fields) = &self.config.target_fields {
                if !fields.contains(&field) {
                    return Err(TransformError::UnexpectedField { field });
                }
            }
            if let Some(first) = sources.insert(field.clone(), column) {
                return Err(TransformError::DuplicateField {
                    field,
                    first: first.to_string(),
                    second: column.to_string(),
                });
            }
            out.insert(field, value.clone());
        }

        for field in &self.config.json_fields {
            if let Some(value) = out.get_mut(field) {
                parse_json_field(field, value)?;
            }
        }

        for field in &self.config.array_fields {
            if let Some(value) = out.get_mut(field) {
                parse_array_field(field, value)?;
            }
        }

        if let Some(field) = &self.config.stamp_field {
            let stamp = self.stamp.unwrap_or_else(|| Utc::now().naive_utc());
            out.insert(field.clone(), stamp);
        }
        if let Some(ttl) = &self.config.ttl {
            out.insert(ttl.field.clone(), ttl.value);
        }
        Ok(out)
    }

    pub fn transform_all(&self, records: &[Record]) -> Result<Vec<TargetRecord>, TransformError> {
        records.iter().map(|r| self.transform(r)).collect()
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, column: &str) -> Option<&'a String> {
    map.get(column).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    })
}

fn parse_json_field(field: &str, value: &mut SyncValue) -> Result<(), TransformError> {
    let parsed = match value {
        SyncValue::Null | SyncValue::Json(_) => return Ok(()),
        SyncValue::String(text) => {
            serde_json::from_str(text).map_err(|source| TransformError::InvalidJson {
                field: field.to_string(),
                source,
            })?
        }
        other => {
            return Err(TransformError::NotJsonText {
                field: field.to_string(),
                found: other.type_name(),
            })
        }
    };
    *value = SyncValue::Json(parsed);
    Ok(())
}

fn parse_array_field(field: &str, value: &mut SyncValue) -> Result<(), TransformError> {
    let json = match value {
        SyncValue::Null | SyncValue::Array(_) => return Ok(()),
        SyncValue::Json(json) => json.clone(),
        SyncValue::String(text) => {
            serde_json::from_str(text).map_err(|source| TransformError::InvalidJson {
                field: field.to_string(),
                source,
            })?
        }
        other => {
            return Err(TransformError::NotArray {
                field: field.to_string(),
                found: format!("a {} value", other.type_name()),
            })
        }
    };
    if !json.is_array() {
        return Err(TransformError::NotArray {
            field: field.to_string(),
            found: format!("JSON {json}"),
        });
    }
    *value = SyncValue::from_json(json);
    Ok(())
}

/// Camel-case a column name.
///
/// Every letter that follows a non-letter is upper-cased and every other
/// letter lower-cased; non-alphanumerics are removed and the first character
/// is lower-cased. `UPDATED_AT` → `updatedAt`, `order id` → `orderId`,
/// `col1name` → `col1Name`.
pub fn camel_case(column: &str) -> String {
    let mut titled = String::with_capacity(column.len());
    let mut prev_is_letter = false;
    for c in column.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
        } else {
            titled.push(c);
        }
        prev_is_letter = c.is_alphabetic();
    }

    let mut chars = titled.chars().filter(|c| c.is_alphanumeric());
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
