use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use job_monitor::{JobApi, JobHandle, JobStatus};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use sync_core::SyncError;
use tracing::{debug, info};

use crate::config::StitchConfig;
use crate::extractions::{parse_trigger_response, status_from_extractions, ExtractionsResponse};

/// HTTP client for the Stitch Connect API.
pub struct StitchClient {
    http: reqwest::Client,
    config: StitchConfig,
}

impl StitchClient {
    pub fn new(config: StitchConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("Invalid header name '{name}'"))?,
                HeaderValue::from_str(value)
                    .with_context(|| format!("Invalid value for header '{name}'"))?,
            );
        }
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Stitch token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Send a request and return the body of a response that is either
    /// successful or carries an API error document.
    async fn request(&self, method: Method, url: &str) -> Result<(StatusCode, String), SyncError> {
        debug!("Stitch {method} {url}");
        let response = self
            .http
            .request(method.clone(), url)
            .send()
            .await
            .with_context(|| format!("Failed to reach Stitch at {url}"))
            .map_err(SyncError::Connection)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::Connection(anyhow::anyhow!(
                "Stitch refused credentials ({status}) for {method} {url}"
            )));
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read Stitch response from {url}"))
            .map_err(SyncError::Connection)?;
        Ok((status, body))
    }
}

#[async_trait]
impl JobApi for StitchClient {
    async fn trigger(&self, source_id: &str) -> Result<JobHandle, SyncError> {
        let url = self.config.trigger_url(source_id);
        let triggered_at = Utc::now();
        let (status, body) = self.request(Method::POST, &url).await?;
        let job_name = parse_trigger_response(&body)
            .with_context(|| format!("Trigger of source {source_id} returned {status}"))
            .map_err(SyncError::Trigger)?;
        info!("Started Stitch extraction {job_name} for source {source_id}");
        Ok(JobHandle {
            source_id: source_id.to_string(),
            job_id: job_name,
            triggered_at,
        })
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, SyncError> {
        let url = self.config.extractions_url();
        let (status, body) = self.request(Method::GET, &url).await?;
        if !status.is_success() {
            return Err(SyncError::Connection(anyhow::anyhow!(
                "Stitch extractions request returned {status}: {body}"
            )));
        }
        let response: ExtractionsResponse = serde_json::from_str(&body)
            .context("Malformed Stitch extractions response")
            .map_err(SyncError::Connection)?;
        status_from_extractions(&response, handle).map_err(SyncError::Connection)
    }
}
