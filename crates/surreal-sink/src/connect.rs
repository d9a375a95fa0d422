use serde::{Deserialize, Serialize};
use std::time::Duration;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use sync_core::SyncError;

/// Connection settings for the document target.
///
/// `endpoint` may be `ws://`, `wss://`, `http(s)://` (rewritten to the
/// WebSocket scheme) or `mem://` for an embedded in-memory instance.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurrealConfig {
    pub endpoint: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub namespace: String,
    pub database: String,
}

fn default_username() -> String {
    "root".to_string()
}

impl std::fmt::Debug for SurrealConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"********")
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .finish()
    }
}

pub type SurrealClient = Surreal<Any>;

/// Default number of connection retry attempts
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
/// Default delay between retry attempts in seconds
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

pub async fn surreal_connect(config: &SurrealConfig) -> Result<Surreal<Any>, SyncError> {
    surreal_connect_with_retries(config, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS)
        .await
        .map_err(SyncError::Connection)
}

/// Connect to SurrealDB with configurable retries.
///
/// Retries connection failures up to `max_retries` times, waiting
/// `retry_delay_secs` seconds between attempts, to ride out a server that is
/// still starting.
pub async fn surreal_connect_with_retries(
    config: &SurrealConfig,
    max_retries: u32,
    retry_delay_secs: u64,
) -> anyhow::Result<Surreal<Any>> {
    let endpoint = config
        .endpoint
        .replace("http://", "ws://")
        .replace("https://", "wss://");

    tracing::debug!(
        "Connecting to SurrealDB at {} (namespace: {}, database: {})",
        endpoint,
        config.namespace,
        config.database
    );

    let mut last_error = anyhow::anyhow!("no connection attempt was made");
    for attempt in 1..=max_retries.max(1) {
        match try_connect(&endpoint, config).await {
            Ok(surreal) => {
                if attempt > 1 {
                    tracing::info!("Connected to SurrealDB after {attempt} attempts");
                }
                return Ok(surreal);
            }
            Err(e) => {
                if attempt < max_retries {
                    tracing::warn!(
                        "Failed to connect to SurrealDB at '{}' (attempt {}/{}): {:#}. Retrying in {}s...",
                        endpoint,
                        attempt,
                        max_retries,
                        e,
                        retry_delay_secs
                    );
                    tokio::time::sleep(Duration::from_secs(retry_delay_secs)).await;
                }
                last_error = e;
            }
        }
    }

    Err(last_error.context(format!(
        "Failed to connect to SurrealDB at '{endpoint}' after {max_retries} attempts"
    )))
}

async fn try_connect(endpoint: &str, config: &SurrealConfig) -> anyhow::Result<Surreal<Any>> {
    let surreal = surrealdb::engine::any::connect(endpoint)
        .await
        .map_err(|e| anyhow::anyhow!("SurrealDB connection to '{endpoint}' failed: {e}"))?;

    // The embedded engine runs without authentication.
    if !endpoint.starts_with("mem://") {
        let username = &config.username;
        surreal
            .signin(surrealdb::opt::auth::Root {
                username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                anyhow::anyhow!("SurrealDB authentication failed (user: '{username}'): {e}")
            })?;
    }

    let (ns, db) = (&config.namespace, &config.database);
    surreal.use_ns(ns).use_db(db).await.map_err(|e| {
        anyhow::anyhow!("SurrealDB failed to select namespace '{ns}' / database '{db}': {e}")
    })?;

    Ok(surreal)
}
