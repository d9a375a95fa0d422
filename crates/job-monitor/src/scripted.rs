//! A [`JobApi`] that replays a fixed status sequence.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use sync_core::SyncError;
use tokio::sync::Mutex;

use crate::api::{JobApi, JobHandle, JobStatus};

/// Returns scripted statuses in order; the last one repeats once the script
/// runs out. A scripted `Err` makes that fetch fail.
#[derive(Default)]
pub struct ScriptedJobApi {
    statuses: Mutex<VecDeque<Result<JobStatus, String>>>,
    last: Mutex<Option<JobStatus>>,
    reject_trigger: Mutex<Option<String>>,
    triggers: AtomicUsize,
    fetches: AtomicUsize,
}

impl ScriptedJobApi {
    pub fn new(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        Self::with_results(statuses.into_iter().map(Ok))
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<JobStatus, String>>) -> Self {
        Self {
            statuses: Mutex::new(results.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Make `trigger` fail with this message.
    pub async fn reject_trigger(&self, message: impl Into<String>) {
        *self.reject_trigger.lock().await = Some(message.into());
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for ScriptedJobApi {
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError> {
        if let Some(message) = self.reject_trigger.lock().await.clone() {
            return Err(SyncError::Trigger(anyhow::Error::msg(message)));
        }
        let n = self.triggers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobHandle {
            source_id: source_id.to_string(),
            job_id: format!("job-{n}"),
            triggered_at: Utc::now(),
        })
    }

    async fn fetch_status(&self, _handle: &JobHandle) -> Result<JobStatus, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().await.pop_front();
        let mut last = self.last.lock().await;
        match next {
            Some(Ok(status)) => {
                *last = Some(status);
                Ok(status)
            }
            Some(Err(message)) => Err(SyncError::Connection(anyhow::Error::msg(message))),
            None => Ok(last.unwrap_or(JobStatus::Unknown)),
        }
    }
}
