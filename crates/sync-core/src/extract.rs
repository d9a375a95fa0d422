//! Source extraction.

use async_trait::async_trait;
use bookmark::{Watermark, WatermarkKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::values::Record;

/// A source that can run a query and return its full result set.
///
/// Implementations report unreachable/unauthenticated sources as
/// [`SyncError::Connection`] and failing statements as
/// [`SyncError::Extraction`].
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError>;
}

#[async_trait]
impl<T: Warehouse + ?Sized> Warehouse for &T {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        (**self).execute(query).await
    }
}

#[async_trait]
impl<T: Warehouse + ?Sized> Warehouse for Box<T> {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        (**self).execute(query).await
    }
}

#[async_trait]
impl<T: Warehouse + ?Sized> Warehouse for Arc<T> {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        (**self).execute(query).await
    }
}

/// The watermark column of an incremental stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementalConfig {
    pub column: String,
    pub kind: WatermarkKind,
}

/// Rows returned by one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub rows: Vec<Record>,
    /// Largest watermark-column value among `rows`; None if there are no rows
    /// or every watermark cell is NULL.
    pub max_watermark: Option<Watermark>,
}

impl ExtractionBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Run `query` and compute the batch's maximum watermark.
pub async fn extract<W: Warehouse + ?Sized>(
    warehouse: &W,
    query: &str,
    incremental: Option<&IncrementalConfig>,
) -> Result<ExtractionBatch, SyncError> {
    debug!("Extracting with query: {query}");
    let rows = warehouse.execute(query).await?;
    let max_watermark = match incremental {
        Some(config) => max_watermark(&rows, config)?,
        None => None,
    };
    info!(
        "Extracted {} rows (max watermark: {})",
        rows.len(),
        max_watermark
            .as_ref()
            .map_or_else(|| "none".to_string(), |w| w.to_string())
    );
    Ok(ExtractionBatch {
        rows,
        max_watermark,
    })
}

/// Maximum of the watermark column across `rows`.
///
/// The column is matched exactly first, then ASCII case-insensitively.
pub fn max_watermark(
    rows: &[Record],
    config: &IncrementalConfig,
) -> Result<Option<Watermark>, SyncError> {
    let mut max: Option<Watermark> = None;
    for (index, row) in rows.iter().enumerate() {
        let value = row.get_ignore_case(&config.column).ok_or_else(|| {
            SyncError::extraction(format!(
                "row {index} has no watermark column '{}'",
                config.column
            ))
        })?;
        let watermark = value.as_watermark(config.kind).map_err(|e| {
            SyncError::Extraction(e.context(format!(
                "row {index}: watermark column '{}' is not a {} value",
                config.column, config.kind
            )))
        })?;
        max = match (max, watermark) {
            (Some(m), Some(w)) => Some(m.max(w)),
            (m, w) => m.or(w),
        };
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWarehouse;
    use crate::values::SyncValue;

    fn config(column: &str) -> IncrementalConfig {
        IncrementalConfig {
            column: column.to_string(),
            kind: WatermarkKind::Int,
        }
    }

    #[tokio::test]
    async fn test_extract_computes_max() {
        let warehouse = MemoryWarehouse::new(vec![
            Record::new().with("id", 1i64).with("updated_at", 5i64),
            Record::new().with("id", 2i64).with("updated_at", 9i64),
            Record::new().with("id", 3i64).with("updated_at", 7i64),
        ]);
        let batch = extract(&warehouse, "SELECT 1", Some(&config("updated_at")))
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.max_watermark, Some(Watermark::Int(9)));
        assert_eq!(warehouse.queries().await, vec!["SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_empty_has_no_watermark() {
        let warehouse = MemoryWarehouse::new(vec![]);
        let batch = extract(&warehouse, "SELECT 1", Some(&config("id")))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.max_watermark, None);
    }

    #[tokio::test]
    async fn test_extract_without_incremental_skips_watermark() {
        let warehouse = MemoryWarehouse::new(vec![Record::new().with("name", "a")]);
        let batch = extract(&warehouse, "SELECT 1", None).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.max_watermark, None);
    }

    #[test]
    fn test_max_watermark_case_insensitive_column() {
        let rows = vec![Record::new().with("UPDATED_AT", 4i64)];
        assert_eq!(
            max_watermark(&rows, &config("updated_at")).unwrap(),
            Some(Watermark::Int(4))
        );
    }

    #[test]
    fn test_max_watermark_all_null() {
        let rows = vec![
            Record::new().with("id", SyncValue::Null),
            Record::new().with("id", SyncValue::Null),
        ];
        assert_eq!(max_watermark(&rows, &config("id")).unwrap(), None);
    }

    #[test]
    fn test_max_watermark_missing_column_is_extraction_error() {
        let rows = vec![Record::new().with("other", 1i64)];
        let err = max_watermark(&rows, &config("id")).unwrap_err();
        assert!(matches!(err, SyncError::Extraction(_)));
    }

    #[test]
    fn test_max_watermark_out_of_range_float_is_extraction_error() {
        let rows = vec![
            Record::new().with("id", 3.0),
            Record::new().with("id", 1e300),
        ];
        let err = max_watermark(&rows, &config("id")).unwrap_err();
        assert!(matches!(err, SyncError::Extraction(_)));
    }

    #[test]
    fn test_max_watermark_wrong_type_is_extraction_error() {
        let rows = vec![Record::new().with("id", "abc")];
        let err = max_watermark(&rows, &config("id")).unwrap_err();
        assert!(matches!(err, SyncError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_extract_propagates_warehouse_failure() {
        let warehouse = MemoryWarehouse::new(vec![]);
        warehouse.fail_next_with("relation does not exist").await;
        let err = extract(&warehouse, "SELECT 1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::Extraction(_)));
    }
}
