//! Pipeline configuration file.
//!
//! ```yaml
//! warehouse:
//!   account: xy12345
//!   region: eu-west-1
//!   login: loader
//!   database: ANALYTICS
//!   schema: PUBLIC
//!   warehouse: LOAD_WH
//! bookmarks:
//!   type: s3
//!   bucket: my-bookmarks
//!   prefix: warehouse-sync
//! postgres:
//!   host: db.internal
//!   login: loader
//!   database: app
//! streams:
//!   - id: orders
//!     query: SELECT * FROM ORDERS
//!     incremental: { column: UPDATED_AT, kind: timestamp }
//!     transform: { format: lower }
//!     target: { store: postgres, table: orders, mode: merge, key: [id] }
//! ```
//!
//! Passwords and tokens can be left out of the file and supplied through
//! `SNOWFLAKE_PASSWORD`, `POSTGRES_PASSWORD`, `SURREAL_PASSWORD` and
//! `STITCH_TOKEN`, which take precedence over file values.

mod duration;

pub use duration::parse_duration;

use anyhow::Context;
use postgresql_sink::{MergeOptions, PostgresConfig};
use serde::{Deserialize, Serialize};
use snowflake::SnowflakeConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stitch::StitchConfig;
use surreal_sink::SurrealConfig;
use sync_core::{IncrementalConfig, LoadMode, StreamDefinition, TransformConfig};

const DEFAULT_BOOKMARK_DIR: &str = ".warehouse-sync-bookmarks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub warehouse: Option<SnowflakeConfig>,
    #[serde(default)]
    pub bookmarks: BookmarkBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
    #[serde(default)]
    pub surreal: Option<SurrealConfig>,
    #[serde(default)]
    pub stitch: Option<StitchConfig>,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// Where bookmarks are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BookmarkBackend {
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
    Filesystem {
        dir: PathBuf,
    },
    /// Process-local; bookmarks are lost on exit.
    Memory,
}

impl Default for BookmarkBackend {
    fn default() -> Self {
        BookmarkBackend::Filesystem {
            dir: PathBuf::from(DEFAULT_BOOKMARK_DIR),
        }
    }
}

/// Defaults for `stitch` commands; flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    pub poll_interval: String,
    pub timeout: Option<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: "60s".to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub incremental: Option<IncrementalConfig>,
    #[serde(default)]
    pub transform: TransformConfig,
    pub target: TargetConfig,
}

impl StreamConfig {
    pub fn definition(&self) -> StreamDefinition {
        StreamDefinition {
            id: self.id.clone(),
            query: self.query.clone(),
            incremental: self.incremental.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStore {
    Postgres,
    Surreal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeName {
    Append,
    Merge,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub store: TargetStore,
    pub table: String,
    pub mode: ModeName,
    #[serde(default)]
    pub key: Vec<String>,
    /// PostgreSQL schema, overriding the connection's default.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub update_columns: Option<Vec<String>>,
    #[serde(default)]
    pub conditional_column: Option<String>,
}

impl TargetConfig {
    pub fn load_mode(&self) -> LoadMode {
        match self.mode {
            ModeName::Append => LoadMode::Append,
            ModeName::Merge => LoadMode::Merge {
                key: self.key.clone(),
            },
            ModeName::Replace => LoadMode::Replace,
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            update_columns: self.update_columns.clone(),
            conditional_column: self.conditional_column.clone(),
        }
    }
}

impl PipelineConfig {
    /// Read, apply environment overrides and validate.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Replace secrets with values from `lookup` (normally the process
    /// environment) where present.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let (Some(warehouse), Some(password)) =
            (self.warehouse.as_mut(), lookup("SNOWFLAKE_PASSWORD"))
        {
            warehouse.password = password;
        }
        if let (Some(postgres), Some(password)) =
            (self.postgres.as_mut(), lookup("POSTGRES_PASSWORD"))
        {
            postgres.password = password;
        }
        if let (Some(surreal), Some(password)) =
            (self.surreal.as_mut(), lookup("SURREAL_PASSWORD"))
        {
            surreal.password = password;
        }
        if let (Some(stitch), Some(token)) = (self.stitch.as_mut(), lookup("STITCH_TOKEN")) {
            stitch.token = Some(token);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.id.as_str()) {
                anyhow::bail!("Duplicate stream id '{}'", stream.id);
            }
            validate_stream(stream).with_context(|| format!("Stream '{}'", stream.id))?;
            if self.warehouse.is_none() {
                anyhow::bail!("Stream '{}' needs a `warehouse` block", stream.id);
            }
            match stream.target.store {
                TargetStore::Postgres if self.postgres.is_none() => {
                    anyhow::bail!("Stream '{}' targets postgres but there is no `postgres` block", stream.id)
                }
                TargetStore::Surreal if self.surreal.is_none() => {
                    anyhow::bail!("Stream '{}' targets surreal but there is no `surreal` block", stream.id)
                }
                _ => {}
            }
        }
        self.monitor_defaults()?;
        Ok(())
    }

    pub fn stream(&self, id: &str) -> anyhow::Result<&StreamConfig> {
        self.streams
            .iter()
            .find(|s| s.id == id)
            .with_context(|| format!("No stream named '{id}' in config"))
    }

    /// The streams named in `ids`, in the order given; all streams in file
    /// order when `ids` is empty.
    pub fn select_streams(&self, ids: &[String]) -> anyhow::Result<Vec<&StreamConfig>> {
        if ids.is_empty() {
            return Ok(self.streams.iter().collect());
        }
        ids.iter().map(|id| self.stream(id)).collect()
    }

    /// Parsed `(poll_interval, timeout)` from the `monitor` block.
    pub fn monitor_defaults(&self) -> anyhow::Result<(Duration, Option<Duration>)> {
        let interval = parse_duration(&self.monitor.poll_interval)
            .context("Invalid monitor.poll_interval")?;
        if interval.is_zero() {
            anyhow::bail!("monitor.poll_interval must be greater than zero");
        }
        let timeout = self
            .monitor
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .context("Invalid monitor.timeout")?;
        Ok((interval, timeout))
    }
}

fn validate_stream(stream: &StreamConfig) -> anyhow::Result<()> {
    if stream.query.trim().is_empty() {
        anyhow::bail!("query is empty");
    }
    let target = &stream.target;
    target.load_mode().validate()?;
    if target.mode != ModeName::Merge && !target.key.is_empty() {
        anyhow::bail!("`key` only applies to merge mode");
    }
    if target.store == TargetStore::Surreal
        && (target.schema.is_some()
            || target.update_columns.is_some()
            || target.conditional_column.is_some())
    {
        anyhow::bail!("schema / update_columns / conditional_column are PostgreSQL-only settings");
    }
    if target.mode == ModeName::Replace && stream.incremental.is_some() {
        anyhow::bail!("replace mode needs a full extraction; drop `incremental` or change mode");
    }
    Ok(())
}
