//! Stitch job commands.

use anyhow::Context;
use chrono::{DateTime, Utc};
use job_monitor::{CancellationToken, JobApi, JobHandle, JobStatus, MonitorConfig, RunMonitor};
use stitch::StitchClient;
use tracing::info;

use crate::config::{parse_duration, PipelineConfig};

/// Job id recorded in handles built from command-line flags; Stitch status
/// lookups only use the source id and trigger time.
pub const EXTERNAL_JOB_ID: &str = "external";

/// Monitor settings from the config's `monitor` block, overridden by flags.
pub fn monitor_config(
    config: &PipelineConfig,
    poll_interval: Option<&str>,
    timeout: Option<&str>,
) -> anyhow::Result<MonitorConfig> {
    let (mut interval, mut deadline) = config.monitor_defaults()?;
    if let Some(flag) = poll_interval {
        interval = parse_duration(flag).context("Invalid --poll-interval")?;
        if interval.is_zero() {
            anyhow::bail!("--poll-interval must be greater than zero");
        }
    }
    if let Some(flag) = timeout {
        deadline = Some(parse_duration(flag).context("Invalid --timeout")?);
    }
    Ok(MonitorConfig {
        poll_interval: interval,
        timeout: deadline,
    })
}

/// Rebuild a handle for a job triggered earlier.
pub fn external_handle(
    source_id: &str,
    job_id: Option<&str>,
    triggered_at: Option<&str>,
) -> anyhow::Result<JobHandle> {
    let triggered_at = match triggered_at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid --triggered-at '{text}', expected RFC 3339"))?
            .with_timezone(&Utc),
        // Without a trigger time any completed extraction counts.
        None => DateTime::<Utc>::UNIX_EPOCH,
    };
    Ok(JobHandle {
        source_id: source_id.to_string(),
        job_id: job_id.unwrap_or(EXTERNAL_JOB_ID).to_string(),
        triggered_at,
    })
}

pub fn stitch_monitor(
    config: &PipelineConfig,
    monitor: MonitorConfig,
) -> anyhow::Result<RunMonitor<StitchClient>> {
    let stitch = config
        .stitch
        .clone()
        .context("No `stitch` connection configured")?;
    Ok(RunMonitor::new(StitchClient::new(stitch)?, monitor))
}

pub async fn trigger<A: JobApi>(
    monitor: &RunMonitor<A>,
    source_id: &str,
) -> anyhow::Result<JobHandle> {
    let handle = monitor.api().trigger(source_id).await?;
    info!("Triggered job {handle}");
    Ok(handle)
}

pub async fn wait<A: JobApi>(
    monitor: &RunMonitor<A>,
    handle: &JobHandle,
    cancel: &CancellationToken,
) -> anyhow::Result<JobStatus> {
    let status = monitor
        .wait_until_terminal(handle, cancel)
        .await
        .with_context(|| format!("Waiting for job {handle}"))?;
    Ok(status)
}
