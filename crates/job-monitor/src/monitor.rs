//! Polling state machine over [`JobStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sync_core::SyncError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{JobApi, JobHandle, JobStatus};

/// Polling cadence and overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// None waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            timeout: None,
        }
    }
}

/// Persistable progress of a host-driven monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub handle: JobHandle,
    pub last_status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub polls: u32,
}

/// What a host should do after [`RunMonitor::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The job reached a successful terminal state.
    Done(JobStatus),
    /// Call `step` again after this delay.
    Reschedule(Duration),
}

/// Drives a triggered job to a terminal status.
pub struct RunMonitor<A> {
    api: A,
    config: MonitorConfig,
}

impl<A: JobApi> RunMonitor<A> {
    pub fn new(api: A, config: MonitorConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Fetch the job's status once. Fetch failures are reported as
    /// [`JobStatus::Unknown`].
    pub async fn poll(&self, handle: &JobHandle) -> JobStatus {
        match self.api.fetch_status(handle).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Status fetch for job {handle} failed, treating as unknown: {e:#}");
                JobStatus::Unknown
            }
        }
    }

    /// Poll until the job succeeds, fails or the timeout elapses.
    ///
    /// Sleeps `poll_interval` between polls. Cancellation is observed while
    /// sleeping and before each poll.
    ///
    /// # Errors
    ///
    /// - [`SyncError::JobFailed`] if the job reports `failed`
    /// - [`SyncError::JobTimeout`] if no terminal status is seen in time
    /// - [`SyncError::Cancelled`] if `cancel` fires
    pub async fn wait_until_terminal(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, SyncError> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let status = self.poll(handle).await;
            polls += 1;
            debug!("Job {handle} poll {polls}: {status}");

            match status {
                JobStatus::Succeeded => {
                    info!("Job {handle} succeeded after {polls} polls");
                    return Ok(status);
                }
                JobStatus::Failed => return Err(job_failed(handle)),
                _ => {}
            }

            let mut wait = self.config.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(self.timed_out(handle));
                }
                wait = wait.min(deadline - now);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Trigger a job for `source_id` and wait for it.
    pub async fn run_and_wait(
        &self,
        source_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JobHandle, SyncError> {
        let handle = self.api.trigger(source_id).await?;
        info!("Triggered job {handle}");
        self.wait_until_terminal(&handle, cancel).await?;
        Ok(handle)
    }

    /// Begin host-driven monitoring at the current time.
    pub fn start(&self, handle: JobHandle) -> MonitorState {
        self.start_at(handle, Utc::now())
    }

    pub fn start_at(&self, handle: JobHandle, now: DateTime<Utc>) -> MonitorState {
        let deadline = self
            .config
            .timeout
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map(|t| now + t);
        MonitorState {
            handle,
            last_status: JobStatus::Unknown,
            started_at: now,
            deadline,
            polls: 0,
        }
    }

    /// Poll once and tell the host whether to come back.
    ///
    /// Errors match [`RunMonitor::wait_until_terminal`], minus cancellation,
    /// which is the host's business.
    pub async fn step(
        &self,
        state: &mut MonitorState,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, SyncError> {
        let status = self.poll(&state.handle).await;
        state.polls += 1;
        state.last_status = status;
        debug!("Job {} step {}: {status}", state.handle, state.polls);

        match status {
            JobStatus::Succeeded => return Ok(StepOutcome::Done(status)),
            JobStatus::Failed => return Err(job_failed(&state.handle)),
            _ => {}
        }

        let mut wait = self.config.poll_interval;
        if let Some(deadline) = state.deadline {
            if now >= deadline {
                return Err(self.timed_out(&state.handle));
            }
            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            wait = wait.min(remaining);
        }
        Ok(StepOutcome::Reschedule(wait))
    }

    fn timed_out(&self, handle: &JobHandle) -> SyncError {
        SyncError::JobTimeout {
            job: handle.to_string(),
            timeout: self.config.timeout.unwrap_or_default(),
        }
    }
}

fn job_failed(handle: &JobHandle) -> SyncError {
    SyncError::JobFailed {
        job: handle.to_string(),
    }
}
