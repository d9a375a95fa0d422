//! Job handle, status and the external job API trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use sync_core::SyncError;

/// Status of an external job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The status could not be determined; treated as transient.
    Unknown,
}

impl JobStatus {
    /// `succeeded` and `failed` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one triggered run of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub source_id: String,
    pub job_id: String,
    /// When the trigger was accepted; runs completing earlier belong to a
    /// previous job.
    pub triggered_at: DateTime<Utc>,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_id, self.job_id)
    }
}

/// A service that runs jobs asynchronously.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Start a job for `source_id`.
    ///
    /// Fails with [`SyncError::Trigger`] when the service rejects the request
    /// and [`SyncError::Connection`] when it cannot be reached.
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError>;

    /// Fetch the current status of a triggered job.
    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, SyncError>;
}

#[async_trait]
impl<T: JobApi + ?Sized> JobApi for &T {
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError> {
        (**self).trigger(source_id).await
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, SyncError> {
        (**self).fetch_status(handle).await
    }
}

#[async_trait]
impl<T: JobApi + ?Sized> JobApi for Box<T> {
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError> {
        (**self).trigger(source_id).await
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, SyncError> {
        (**self).fetch_status(handle).await
    }
}

#[async_trait]
impl<T: JobApi + ?Sized> JobApi for Arc<T> {
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError> {
        (**self).trigger(source_id).await
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, SyncError> {
        (**self).fetch_status(handle).await
    }
}
