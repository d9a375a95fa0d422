//! The SurrealDB [`Loader`].

use anyhow::Context;
use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::sql::{Array, Object, Value};
use surrealdb::Surreal;
use sync_core::{dedupe_by_key, key_values, LoadMode, Loader, SyncError, TargetRecord};
use tracing::{debug, info};

use crate::value::{key_to_id, record_to_object};

/// Field holding the record id.
const ID_FIELD: &str = "id";

/// Loads batches into one table.
pub struct SurrealLoader {
    surreal: Surreal<Any>,
    table: String,
    mode: LoadMode,
}

impl SurrealLoader {
    pub fn new(
        surreal: Surreal<Any>,
        table: impl Into<String>,
        mode: LoadMode,
    ) -> Result<Self, SyncError> {
        mode.validate()?;
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            surreal,
            table,
            mode,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn append(&self, records: &[TargetRecord]) -> anyhow::Result<()> {
        let query = format!("INSERT INTO {} $records", self.table);
        debug!("Executing: {query}");
        self.surreal
            .query(query)
            .bind(("records", documents(records)))
            .await
            .context("Failed to send insert")?
            .check()
            .context("Insert was rejected")?;
        Ok(())
    }

    /// Upsert each record at the id derived from `key`.
    ///
    /// The record id owns the `id` field, so `id` is left out of the merged
    /// data. A record carrying an `id` that is not part of the key would lose
    /// it and is rejected instead.
    async fn merge(&self, records: &[TargetRecord], key: &[String]) -> anyhow::Result<()> {
        let records = dedupe_by_key(records, key)?;
        let key_has_id = key.iter().any(|k| k == ID_FIELD);
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            if !key_has_id && record.get(ID_FIELD).is_some_and(|v| !v.is_null()) {
                anyhow::bail!(
                    "field '{ID_FIELD}' is the record id in SurrealDB but is not part of merge key {key:?}; rename it or add it to the key"
                );
            }
            let mut data = record_to_object(record);
            data.remove(ID_FIELD);
            let mut row = Object::default();
            row.insert("key".to_string(), key_to_id(&key_values(record, key)?));
            row.insert("data".to_string(), Value::Object(data));
            rows.push(Value::Object(row));
        }

        let query = "BEGIN TRANSACTION;\n\
             FOR $row IN $rows { UPSERT type::thing($table, $row.key) MERGE $row.data; };\n\
             COMMIT TRANSACTION;";
        debug!("Executing: {query}");
        self.surreal
            .query(query)
            .bind(("table", self.table.clone()))
            .bind(("rows", Value::Array(Array::from(rows))))
            .await
            .context("Failed to send merge")?
            .check()
            .context("Merge transaction was rejected")?;
        Ok(())
    }

    async fn replace(&self, records: &[TargetRecord]) -> anyhow::Result<()> {
        let mut query = format!("BEGIN TRANSACTION;\nDELETE {};\n", self.table);
        if !records.is_empty() {
            query.push_str(&format!("INSERT INTO {} $records;\n", self.table));
        }
        query.push_str("COMMIT TRANSACTION;");
        debug!("Executing: {query}");
        self.surreal
            .query(query)
            .bind(("records", documents(records)))
            .await
            .context("Failed to send replace")?
            .check()
            .context("Replace transaction was rejected")?;
        Ok(())
    }
}

#[async_trait]
impl Loader for SurrealLoader {
    fn mode(&self) -> &LoadMode {
        &self.mode
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        if records.is_empty() && self.mode != LoadMode::Replace {
            return Ok(0);
        }
        let result = match &self.mode {
            LoadMode::Append => self.append(records).await,
            LoadMode::Merge { key } => self.merge(records, key).await,
            LoadMode::Replace => self.replace(records).await,
        };
        result
            .with_context(|| format!("{} load into {}", self.mode.name(), self.table))
            .map_err(SyncError::Load)?;
        info!("Loaded {} records into {}", records.len(), self.table);
        Ok(records.len())
    }
}

fn documents(records: &[TargetRecord]) -> Value {
    Value::Array(Array::from(
        records
            .iter()
            .map(|r| Value::Object(record_to_object(r)))
            .collect::<Vec<_>>(),
    ))
}

/// Table names are spliced into statements, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<(), SyncError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!(
            "'{table}' is not a valid SurrealDB table name"
        )))
    }
}
