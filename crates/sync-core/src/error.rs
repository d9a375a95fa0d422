//! Error types surfaced by the replication engine.

use std::time::Duration;
use thiserror::Error;

/// Errors from a sync or job-monitoring run.
///
/// Variants carrying an [`anyhow::Error`] keep the backend's full context
/// chain as their source; print with `{:#}` to see it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection failed")]
    Connection(#[source] anyhow::Error),

    #[error("extraction failed")]
    Extraction(#[source] anyhow::Error),

    #[error("transform failed")]
    Transform(#[from] TransformError),

    #[error("load failed")]
    Load(#[source] anyhow::Error),

    #[error("job trigger failed")]
    Trigger(#[source] anyhow::Error),

    #[error("job {job} failed")]
    JobFailed { job: String },

    #[error("job {job} did not finish within {timeout:?}")]
    JobTimeout { job: String, timeout: Duration },

    #[error("bookmark store error")]
    Bookmark(#[source] anyhow::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn extraction(msg: impl std::fmt::Display) -> Self {
        Self::Extraction(anyhow::anyhow!("{msg}"))
    }

    pub fn load(msg: impl std::fmt::Display) -> Self {
        Self::Load(anyhow::anyhow!("{msg}"))
    }
}

/// A source row that cannot be mapped onto the target shape.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column '{column}' has no target field mapping")]
    UnmappedColumn { column: String },

    #[error("field '{field}' is not one of the declared target fields")]
    UnexpectedField { field: String },

    #[error("columns '{first}' and '{second}' both map to field '{field}'")]
    DuplicateField {
        field: String,
        first: String,
        second: String,
    },

    #[error("field '{field}' does not hold valid JSON")]
    InvalidJson {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("field '{field}' is declared as JSON but holds a {found} value")]
    NotJsonText { field: String, found: &'static str },

    #[error("field '{field}' is declared as an array but holds {found}")]
    NotArray { field: String, found: String },
}
