use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sync_core::{Record, SyncError, Warehouse};
use tracing::{debug, info};

use crate::config::SnowflakeConfig;
use crate::decode::{decode_cell, ColumnType};
use crate::protocol::{
    parse_chunk_rows, LoginData, LoginRequest, LoginResponseData, QueryRequest,
    QueryResponseData, Response, QUERY_IN_PROGRESS, QUERY_IN_PROGRESS_ASYNC,
};

const CLIENT_APP_ID: &str = "warehouse-sync";
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// An authenticated Snowflake session.
pub struct SnowflakeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    sequence: AtomicU64,
}

impl SnowflakeClient {
    /// Log in and open a session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connection`] if the account cannot be reached or
    /// rejects the credentials.
    pub async fn connect(config: &SnowflakeConfig) -> Result<Self, SyncError> {
        Self::login(config).await.map_err(SyncError::Connection)
    }

    async fn login(config: &SnowflakeConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = config.base_url();

        let mut query = vec![
            ("databaseName", config.database.as_str()),
            ("schemaName", config.schema.as_str()),
            ("warehouse", config.warehouse.as_str()),
        ];
        if let Some(role) = &config.role {
            query.push(("roleName", role.as_str()));
        }

        let body = login_request(config);

        let url = format!("{base_url}/session/v1/login-request");
        let response = http
            .post(&url)
            .query(&query)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Snowflake at {url}"))?;
        let response: Response<LoginResponseData> = read_json(response, &url).await?;
        if !response.success {
            anyhow::bail!(
                "Snowflake login as '{}' failed: {}",
                config.login,
                response.describe_failure()
            );
        }
        let token = response
            .data
            .and_then(|d| d.token)
            .context("Snowflake login response has no session token")?;

        info!(
            "Connected to Snowflake account {} as {}",
            config.account, config.login
        );
        Ok(Self {
            http,
            base_url,
            token,
            sequence: AtomicU64::new(1),
        })
    }

    fn auth_header(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }

    /// Run a statement and return the decoded rows of its result.
    pub async fn query(&self, sql: &str) -> anyhow::Result<Vec<Record>> {
        let data = self.submit(sql).await?;
        if let Some(format) = data.query_result_format.as_deref() {
            if !format.eq_ignore_ascii_case("json") {
                anyhow::bail!("Unsupported Snowflake result format '{format}'");
            }
        }

        let columns: Vec<ColumnType> = data
            .rowtype
            .iter()
            .map(|r| ColumnType {
                name: r.name.clone(),
                kind: r.kind.to_ascii_lowercase(),
                scale: r.scale,
            })
            .collect();

        let mut rows = Vec::with_capacity(data.rowset.len());
        for raw in &data.rowset {
            rows.push(decode_row(&columns, raw)?);
        }

        if !data.chunks.is_empty() {
            let headers = chunk_headers(&data)?;
            for (index, chunk) in data.chunks.iter().enumerate() {
                debug!(
                    "Downloading result chunk {}/{} ({} rows)",
                    index + 1,
                    data.chunks.len(),
                    chunk.row_count
                );
                let body = self
                    .http
                    .get(&chunk.url)
                    .headers(headers.clone())
                    .send()
                    .await
                    .context("Failed to download result chunk")?
                    .error_for_status()
                    .context("Result chunk download was refused")?
                    .text()
                    .await
                    .context("Failed to read result chunk")?;
                for raw in parse_chunk_rows(&body).context("Malformed result chunk")? {
                    rows.push(decode_row(&columns, &raw)?);
                }
            }
        }
        Ok(rows)
    }

    async fn submit(&self, sql: &str) -> anyhow::Result<QueryResponseData> {
        let url = format!("{}/queries/v1/query-request", self.base_url);
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id: self.sequence.fetch_add(1, Ordering::SeqCst),
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        let response = self
            .http
            .post(&url)
            .query(&[("requestId", request_id.as_str())])
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/snowflake")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Snowflake at {url}"))?;
        let mut response: Response<QueryResponseData> = read_json(response, &url).await?;

        // Long-running statements answer "in progress" with a result URL to poll
        while matches!(
            response.code.as_deref(),
            Some(QUERY_IN_PROGRESS | QUERY_IN_PROGRESS_ASYNC)
        ) {
            let result_url = response
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .context("In-progress query response has no result URL")?;
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
            let url = format!("{}{result_url}", self.base_url);
            let polled = self
                .http
                .get(&url)
                .header(AUTHORIZATION, self.auth_header())
                .header(ACCEPT, "application/snowflake")
                .send()
                .await
                .with_context(|| format!("Failed to poll query result at {url}"))?;
            response = read_json(polled, &url).await?;
        }

        if !response.success {
            anyhow::bail!("Snowflake query failed: {}", response.describe_failure());
        }
        let data = response.data.unwrap_or_default();
        if let Some(id) = &data.query_id {
            debug!("Snowflake query {id} returned {} inline rows", data.rowset.len());
        }
        Ok(data)
    }
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        self.query(query).await.map_err(SyncError::Extraction)
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> anyhow::Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read response from {url}"))?;
    if !status.is_success() {
        anyhow::bail!("{url} returned {status}: {body}");
    }
    serde_json::from_str(&body).with_context(|| format!("Malformed response from {url}"))
}

fn decode_row(columns: &[ColumnType], raw: &[Option<String>]) -> anyhow::Result<Record> {
    if raw.len() != columns.len() {
        anyhow::bail!(
            "Row has {} cells but the result has {} columns",
            raw.len(),
            columns.len()
        );
    }
    let mut record = Record::new();
    for (column, cell) in columns.iter().zip(raw) {
        let value = decode_cell(column, cell.as_deref())
            .with_context(|| format!("Failed to decode column {}", column.name))?;
        record.push(column.name.clone(), value);
    }
    Ok(record)
}

/// Headers required to download result chunks.
fn chunk_headers(data: &QueryResponseData) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match (&data.chunk_headers, &data.qrmk) {
        (Some(given), _) => {
            for (name, value) in given {
                let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                headers.insert(
                    HeaderName::from_bytes(name.as_bytes())
                        .with_context(|| format!("Invalid chunk header name '{name}'"))?,
                    HeaderValue::from_str(&value)
                        .with_context(|| format!("Invalid chunk header value for '{name}'"))?,
                );
            }
        }
        (None, Some(qrmk)) => {
            headers.insert(
                HeaderName::from_static("x-amz-server-side-encryption-customer-algorithm"),
                HeaderValue::from_static("AES256"),
            );
            headers.insert(
                HeaderName::from_static("x-amz-server-side-encryption-customer-key"),
                HeaderValue::from_str(qrmk).context("Invalid result master key")?,
            );
        }
        (None, None) => {}
    }
    Ok(headers)
}

/// Login body. The session runs in UTC so timestamp literals in bookmark
/// predicates compare against TIMESTAMP_LTZ and TIMESTAMP_TZ columns in the
/// same zone the decoder normalizes them to.
fn login_request(config: &SnowflakeConfig) -> LoginRequest<'_> {
    LoginRequest {
        data: LoginData {
            client_app_id: CLIENT_APP_ID,
            client_app_version: env!("CARGO_PKG_VERSION"),
            account_name: &config.account,
            login_name: &config.login,
            password: &config.password,
            session_parameters: serde_json::json!({
                "QUERY_RESULT_FORMAT": "JSON",
                "TIMEZONE": "UTC",
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::SyncValue;

    #[test]
    fn test_login_request_pins_session_to_utc() {
        let config = SnowflakeConfig {
            account: "xy12345".to_string(),
            region: None,
            login: "loader".to_string(),
            password: "hunter2".to_string(),
            database: "ANALYTICS".to_string(),
            schema: "PUBLIC".to_string(),
            warehouse: "LOAD_WH".to_string(),
            role: None,
            host: None,
        };
        let body = serde_json::to_value(login_request(&config)).unwrap();
        let data = &body["data"];
        assert_eq!(data["LOGIN_NAME"], "loader");
        assert_eq!(data["SESSION_PARAMETERS"]["TIMEZONE"], "UTC");
        assert_eq!(data["SESSION_PARAMETERS"]["QUERY_RESULT_FORMAT"], "JSON");
    }

    fn columns() -> Vec<ColumnType> {
        vec![
            ColumnType {
                name: "ID".to_string(),
                kind: "fixed".to_string(),
                scale: Some(0),
            },
            ColumnType {
                name: "NAME".to_string(),
                kind: "text".to_string(),
                scale: None,
            },
        ]
    }

    #[test]
    fn test_decode_row() {
        let record =
            decode_row(&columns(), &[Some("7".to_string()), None]).unwrap();
        assert_eq!(record.get("ID"), Some(&SyncValue::Int(7)));
        assert_eq!(record.get("NAME"), Some(&SyncValue::Null));
    }

    #[test]
    fn test_decode_row_width_mismatch() {
        assert!(decode_row(&columns(), &[Some("7".to_string())]).is_err());
    }

    #[test]
    fn test_chunk_headers_from_qrmk() {
        let data = QueryResponseData {
            qrmk: Some("a2V5".to_string()),
            ..Default::default()
        };
        let headers = chunk_headers(&data).unwrap();
        assert_eq!(
            headers
                .get("x-amz-server-side-encryption-customer-key")
                .unwrap(),
            "a2V5"
        );
    }

    #[test]
    fn test_chunk_headers_given() {
        let mut given = serde_json::Map::new();
        given.insert("x-custom".to_string(), serde_json::json!("v"));
        let data = QueryResponseData {
            chunk_headers: Some(given),
            qrmk: Some("ignored".to_string()),
            ..Default::default()
        };
        let headers = chunk_headers(&data).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-custom").unwrap(), "v");
    }
}
