//! Wiring configured streams to live connections.

use anyhow::Context;
use bookmark::{BookmarkStore, FilesystemStore, MemoryStore, S3Store};
use job_monitor::CancellationToken;
use postgresql_sink::{new_postgresql_client, PostgresLoader, SharedClient};
use snowflake::SnowflakeClient;
use std::sync::Arc;
use surreal_sink::{surreal_connect, SurrealClient, SurrealLoader};
use sync_core::{IncrementalSync, Loader, RowTransformer, SyncError, SyncOutcome, Warehouse};
use tracing::info;

use crate::config::{BookmarkBackend, PipelineConfig, StreamConfig, TargetConfig, TargetStore};

pub async fn open_bookmark_store(backend: &BookmarkBackend) -> Arc<dyn BookmarkStore> {
    match backend {
        BookmarkBackend::S3 { bucket, prefix } => {
            info!("Bookmarks in s3://{bucket}/{prefix}");
            Arc::new(S3Store::from_env(bucket.clone(), prefix.clone()).await)
        }
        BookmarkBackend::Filesystem { dir } => {
            info!("Bookmarks in {}", dir.display());
            Arc::new(FilesystemStore::new(dir.clone()))
        }
        BookmarkBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Target connections, opened on first use and shared by every stream of a
/// run.
pub struct Targets<'a> {
    config: &'a PipelineConfig,
    postgres: Option<SharedClient>,
    surreal: Option<SurrealClient>,
}

impl<'a> Targets<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            postgres: None,
            surreal: None,
        }
    }

    pub async fn loader(&mut self, target: &TargetConfig) -> Result<Box<dyn Loader>, SyncError> {
        match target.store {
            TargetStore::Postgres => {
                let settings = self.config.postgres.as_ref().ok_or_else(|| {
                    SyncError::Config("no `postgres` connection configured".to_string())
                })?;
                let client = match &self.postgres {
                    Some(client) => client.clone(),
                    None => {
                        let client = new_postgresql_client(settings).await?;
                        self.postgres = Some(client.clone());
                        client
                    }
                };
                let schema = target.schema.as_deref().unwrap_or(&settings.schema);
                Ok(Box::new(PostgresLoader::new(
                    client,
                    schema,
                    target.table.clone(),
                    target.load_mode(),
                    target.merge_options(),
                )?))
            }
            TargetStore::Surreal => {
                let settings = self.config.surreal.as_ref().ok_or_else(|| {
                    SyncError::Config("no `surreal` connection configured".to_string())
                })?;
                let surreal = match &self.surreal {
                    Some(surreal) => surreal.clone(),
                    None => {
                        let surreal = surreal_connect(settings).await?;
                        self.surreal = Some(surreal.clone());
                        surreal
                    }
                };
                Ok(Box::new(SurrealLoader::new(
                    surreal,
                    target.table.clone(),
                    target.load_mode(),
                )?))
            }
        }
    }
}

/// Run one configured stream against already-open components.
pub async fn run_stream<W, L, S>(
    stream: &StreamConfig,
    warehouse: W,
    loader: L,
    store: S,
) -> Result<SyncOutcome, SyncError>
where
    W: Warehouse,
    L: Loader,
    S: BookmarkStore,
{
    let sync = IncrementalSync::new(
        stream.definition(),
        warehouse,
        RowTransformer::new(stream.transform.clone()),
        loader,
        store,
    )?;
    sync.run().await
}

/// Run the selected streams in order, stopping at the first failure.
///
/// `cancel` is checked before each stream; a stream that has started runs to
/// completion.
pub async fn run_streams(
    config: &PipelineConfig,
    ids: &[String],
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<(String, SyncOutcome)>> {
    let streams = config.select_streams(ids)?;
    if streams.is_empty() {
        info!("No streams configured");
        return Ok(Vec::new());
    }

    let warehouse_config = config
        .warehouse
        .as_ref()
        .context("No `warehouse` connection configured")?;
    let warehouse = SnowflakeClient::connect(warehouse_config).await?;
    let store = open_bookmark_store(&config.bookmarks).await;
    let mut targets = Targets::new(config);

    let mut outcomes = Vec::with_capacity(streams.len());
    for stream in streams {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled.into());
        }
        let outcome = async {
            let loader = targets.loader(&stream.target).await?;
            run_stream(stream, &warehouse, loader, store.clone()).await
        }
        .await
        .with_context(|| format!("Stream '{}' failed", stream.id))?;
        info!("Stream '{}': {}", stream.id, describe(&outcome));
        outcomes.push((stream.id.clone(), outcome));
    }
    Ok(outcomes)
}

pub fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::NoOp => "no new rows".to_string(),
        SyncOutcome::Loaded {
            rows,
            previous,
            watermark,
            advanced,
        } => {
            let mut text = format!("loaded {rows} rows");
            match (advanced, watermark) {
                (true, Some(watermark)) => {
                    let from = previous
                        .as_ref()
                        .map_or_else(|| "none".to_string(), |w| w.to_string());
                    text.push_str(&format!(", bookmark {from} -> {watermark}"));
                }
                (false, Some(watermark)) => {
                    text.push_str(&format!(", bookmark kept (batch max {watermark})"))
                }
                (_, None) => {}
            }
            text
        }
    }
}
