//! Request and response bodies of the Snowflake REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Statement still executing; follow `getResultUrl`.
pub const QUERY_IN_PROGRESS: &str = "333333";
pub const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub data: LoginData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginData<'a> {
    pub client_app_id: &'a str,
    pub client_app_version: &'a str,
    pub account_name: &'a str,
    pub login_name: &'a str,
    pub password: &'a str,
    pub session_parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub sql_text: &'a str,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub query_submission_time: i64,
}

/// Envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl<T> Response<T> {
    pub fn describe_failure(&self) -> String {
        format!(
            "{} (code {})",
            self.message.as_deref().unwrap_or("no message"),
            self.code.as_deref().unwrap_or("none")
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginResponseData {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponseData {
    #[serde(default)]
    pub rowtype: Vec<RowType>,
    #[serde(default)]
    pub rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub chunk_headers: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub qrmk: Option<String>,
    #[serde(default)]
    pub query_result_format: Option<String>,
    #[serde(default)]
    pub get_result_url: Option<String>,
    #[serde(default)]
    pub query_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub url: String,
    #[serde(default)]
    pub row_count: usize,
}

/// Chunk bodies are comma-separated row arrays without the enclosing brackets.
pub fn parse_chunk_rows(body: &str) -> serde_json::Result<Vec<Vec<Option<String>>>> {
    let trimmed = body.trim();
    if trimmed.starts_with("[[") || trimmed == "[]" {
        return serde_json::from_str(trimmed);
    }
    serde_json::from_str(&format!("[{trimmed}]"))
}
