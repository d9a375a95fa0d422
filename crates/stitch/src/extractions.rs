//! Stitch response bodies and their mapping onto job statuses.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use job_monitor::{JobHandle, JobStatus};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    job_name: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

/// Job name from a trigger response, or the API's error.
pub fn parse_trigger_response(body: &str) -> anyhow::Result<String> {
    let response: TriggerResponse =
        serde_json::from_str(body).context("Malformed Stitch trigger response")?;
    if let Some(error) = response.error {
        anyhow::bail!(
            "Stitch rejected the trigger: {} ({})",
            error.message.as_deref().unwrap_or("no message"),
            error.kind.as_deref().unwrap_or("unknown error")
        );
    }
    response
        .job_name
        .context("Stitch trigger response has no job_name")
}

/// `GET {host}/{client_id}/extractions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionsResponse {
    #[serde(default)]
    pub data: Vec<Extraction>,
}

/// Latest extraction of one source.
#[derive(Debug, Clone, Deserialize)]
pub struct Extraction {
    /// Numeric in the API; compared as text.
    pub source_id: serde_json::Value,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub tap_exit_status: Option<i64>,
}

impl Extraction {
    fn source_id_text(&self) -> String {
        match &self.source_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Status of `handle`'s job given the client's extraction list.
///
/// - no entry for the source → unknown
/// - no completion time → running
/// - completed before the trigger → pending
/// - exit status 0 → succeeded, anything else → failed
pub fn status_from_extractions(
    response: &ExtractionsResponse,
    handle: &JobHandle,
) -> anyhow::Result<JobStatus> {
    let Some(extraction) = response
        .data
        .iter()
        .find(|e| e.source_id_text() == handle.source_id)
    else {
        return Ok(JobStatus::Unknown);
    };

    let Some(completed) = extraction.completion_time.as_deref() else {
        return Ok(JobStatus::Running);
    };
    let completed = parse_api_time(completed)?;
    if completed < handle.triggered_at {
        return Ok(JobStatus::Pending);
    }

    Ok(match extraction.tap_exit_status {
        Some(0) => JobStatus::Succeeded,
        _ => JobStatus::Failed,
    })
}

fn parse_api_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|ts| ts.and_utc())
        .with_context(|| format!("Unrecognized Stitch timestamp '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn handle() -> JobHandle {
        JobHandle {
            source_id: "42".to_string(),
            job_id: "42.1.1".to_string(),
            triggered_at: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn extractions(json: serde_json::Value) -> ExtractionsResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_trigger_response() {
        assert_eq!(
            parse_trigger_response(r#"{"job_name": "42.123.1"}"#).unwrap(),
            "42.123.1"
        );
        let err = parse_trigger_response(
            r#"{"error": {"type": "already_running", "message": "extraction already running"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("extraction already running"));
        assert!(parse_trigger_response("{}").is_err());
        assert!(parse_trigger_response("<html>").is_err());
    }

    #[test]
    fn test_missing_source_is_unknown() {
        let response = extractions(serde_json::json!({"data": [], "links": {}}));
        assert_eq!(
            status_from_extractions(&response, &handle()).unwrap(),
            JobStatus::Unknown
        );
    }

    #[test]
    fn test_no_completion_is_running() {
        let response = extractions(serde_json::json!({
            "data": [{"source_id": 42, "start_time": "2022-01-01T00:00:05Z", "completion_time": null}]
        }));
        assert_eq!(
            status_from_extractions(&response, &handle()).unwrap(),
            JobStatus::Running
        );
    }

    #[test]
    fn test_completion_before_trigger_is_pending() {
        let response = extractions(serde_json::json!({
            "data": [{"source_id": 42, "completion_time": "2021-12-31T23:59:59Z", "tap_exit_status": 0}]
        }));
        assert_eq!(
            status_from_extractions(&response, &handle()).unwrap(),
            JobStatus::Pending
        );
    }

    #[test]
    fn test_exit_status_decides_outcome() {
        let ok = extractions(serde_json::json!({
            "data": [{"source_id": "42", "completion_time": "2022-01-01T00:00:00Z", "tap_exit_status": 0}]
        }));
        assert_eq!(
            status_from_extractions(&ok, &handle()).unwrap(),
            JobStatus::Succeeded
        );

        let failed = extractions(serde_json::json!({
            "data": [
                {"source_id": 7, "completion_time": "2022-01-02T00:00:00Z", "tap_exit_status": 0},
                {"source_id": 42, "completion_time": "2022-01-02T00:00:00Z", "tap_exit_status": 1}
            ]
        }));
        assert_eq!(
            status_from_extractions(&failed, &handle()).unwrap(),
            JobStatus::Failed
        );
    }

    #[test]
    fn test_bad_timestamp_is_error() {
        let response = extractions(serde_json::json!({
            "data": [{"source_id": 42, "completion_time": "yesterday", "tap_exit_status": 0}]
        }));
        assert!(status_from_extractions(&response, &handle()).is_err());
    }
}
