//! The PostgreSQL [`Loader`].

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use sync_core::{dedupe_by_key, LoadMode, Loader, SyncError, SyncValue, TargetRecord};
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Transaction};
use tracing::{debug, info};

use crate::statements;
use crate::value::PgValue;

/// Upper bound on bind parameters per statement (the protocol allows 65535).
const MAX_PARAMS: usize = 60_000;

const STAGING_TABLE: &str = "warehouse_sync_staging";

static NULL: SyncValue = SyncValue::Null;

/// Merge tuning taken from the stream's target settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeOptions {
    /// Columns overwritten on conflict; defaults to every non-key column.
    pub update_columns: Option<Vec<String>>,
    /// Only overwrite a matched row if the incoming value of this column is
    /// greater than or equal to the stored one.
    pub conditional_column: Option<String>,
}

/// Loads batches into one table.
pub struct PostgresLoader {
    client: Arc<Mutex<Client>>,
    schema: String,
    table: String,
    mode: LoadMode,
    options: MergeOptions,
}

impl PostgresLoader {
    pub fn new(
        client: Arc<Mutex<Client>>,
        schema: impl Into<String>,
        table: impl Into<String>,
        mode: LoadMode,
        options: MergeOptions,
    ) -> Result<Self, SyncError> {
        mode.validate()?;
        if let LoadMode::Merge { key } = &mode {
            for column in options.update_columns.iter().flatten() {
                if key.contains(column) {
                    return Err(SyncError::Config(format!(
                        "update column '{column}' is part of the merge key"
                    )));
                }
            }
        } else if options != MergeOptions::default() {
            return Err(SyncError::Config(format!(
                "update_columns / conditional_column only apply to merge mode, not {}",
                mode.name()
            )));
        }
        Ok(Self {
            client,
            schema: schema.into(),
            table: table.into(),
            mode,
            options,
        })
    }

    fn target(&self) -> String {
        statements::qualified(&self.schema, &self.table)
    }

    async fn table_columns(&self, tx: &Transaction<'_>) -> anyhow::Result<Vec<String>> {
        let rows = tx
            .query(statements::TABLE_COLUMNS, &[&self.schema, &self.table])
            .await
            .context("Failed to read target table columns")?;
        let columns: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        if columns.is_empty() {
            anyhow::bail!("Target table {}.{} does not exist", self.schema, self.table);
        }
        Ok(columns)
    }

    async fn load_in_transaction(&self, records: &[TargetRecord]) -> anyhow::Result<usize> {
        let records = match &self.mode {
            LoadMode::Merge { key } => dedupe_by_key(records, key)?,
            _ => records.to_vec(),
        };
        let columns = batch_columns(&records);

        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        let known = self.table_columns(&tx).await?;
        if let Some(unknown) = columns.iter().find(|c| !known.contains(c)) {
            anyhow::bail!(
                "Field '{unknown}' has no column in {}.{}",
                self.schema,
                self.table
            );
        }

        let target = self.target();
        match &self.mode {
            LoadMode::Append => {
                insert_rows(&tx, &target, &columns, &records).await?;
            }
            LoadMode::Replace => {
                tx.execute(&statements::truncate(&target), &[])
                    .await
                    .context("Failed to truncate target")?;
                insert_rows(&tx, &target, &columns, &records).await?;
            }
            LoadMode::Merge { key } => {
                if let Some(missing) = key.iter().find(|k| !columns.contains(k)) {
                    anyhow::bail!("Merge key column '{missing}' is not in the batch");
                }
                let update = self.update_columns(&columns, key, &known)?;
                tx.execute(&statements::create_staging(STAGING_TABLE, &target), &[])
                    .await
                    .context("Failed to create staging table")?;
                insert_rows(&tx, &statements::quote_ident(STAGING_TABLE), &columns, &records)
                    .await?;
                let merge = statements::merge(
                    &target,
                    STAGING_TABLE,
                    &columns,
                    key,
                    &update,
                    self.options.conditional_column.as_deref(),
                );
                debug!("Merging with: {merge}");
                let affected = tx
                    .execute(&merge, &[])
                    .await
                    .context("Failed to merge staged rows")?;
                debug!("Merge touched {affected} rows");
            }
        }

        tx.commit().await.context("Failed to commit load")?;
        Ok(records.len())
    }

    fn update_columns(
        &self,
        columns: &[String],
        key: &[String],
        known: &[String],
    ) -> anyhow::Result<Vec<String>> {
        if let Some(conditional) = &self.options.conditional_column {
            if !known.contains(conditional) {
                anyhow::bail!("Conditional column '{conditional}' is not in the target table");
            }
        }
        match &self.options.update_columns {
            Some(explicit) => {
                if let Some(missing) = explicit.iter().find(|c| !columns.contains(c)) {
                    anyhow::bail!("Update column '{missing}' is not in the batch");
                }
                Ok(explicit.clone())
            }
            None => Ok(columns
                .iter()
                .filter(|c| !key.contains(c))
                .cloned()
                .collect()),
        }
    }
}

#[async_trait]
impl Loader for PostgresLoader {
    fn mode(&self) -> &LoadMode {
        &self.mode
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        if records.is_empty() && self.mode != LoadMode::Replace {
            return Ok(0);
        }
        let rows = self
            .load_in_transaction(records)
            .await
            .with_context(|| format!("{} load into {}", self.mode.name(), self.target()))
            .map_err(SyncError::Load)?;
        info!("Loaded {rows} rows into {}.{}", self.schema, self.table);
        Ok(rows)
    }
}

/// Union of all field names in the batch, sorted.
fn batch_columns(records: &[TargetRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.field_names().map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn insert_rows(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[String],
    records: &[TargetRecord],
) -> anyhow::Result<()> {
    if records.is_empty() || columns.is_empty() {
        return Ok(());
    }
    let rows_per_statement = (MAX_PARAMS / columns.len()).max(1);
    for chunk in records.chunks(rows_per_statement) {
        let cells: Vec<&SyncValue> = chunk
            .iter()
            .flat_map(|record| {
                columns
                    .iter()
                    .map(move |c| record.get(c).unwrap_or(&NULL))
            })
            .collect();
        let values: Vec<PgValue<'_>> = cells.into_iter().map(PgValue).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let sql = statements::insert(table, columns, chunk.len());
        tx.execute(&sql, &params)
            .await
            .with_context(|| format!("Failed to insert {} rows into {table}", chunk.len()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_columns_union() {
        let records = vec![
            TargetRecord::new().with("b", 1i64),
            TargetRecord::new().with("a", 1i64).with("b", 2i64),
        ];
        assert_eq!(batch_columns(&records), vec!["a", "b"]);
    }
}
