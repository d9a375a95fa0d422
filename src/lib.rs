//! warehouse-sync
//!
//! Incremental, bookmark-driven replication from a data warehouse into
//! PostgreSQL or SurrealDB, plus triggering and monitoring of external
//! extraction jobs.
//!
//! # Crates
//!
//! - `bookmark` - Watermarks and their durable stores (S3, filesystem, memory)
//! - `sync-core` - Query rewriting, extraction, transformation, loading and
//!   the per-stream sync state machine
//! - `warehouse-sync-snowflake` - The Snowflake source
//! - `warehouse-sync-postgresql-sink` / `warehouse-sync-surreal-sink` - Targets
//! - `job-monitor` / `warehouse-sync-stitch` - Job trigger and run monitor
//!
//! This crate holds the YAML pipeline [`config`], the wiring from config to
//! live connections ([`pipeline`]) and the Stitch commands ([`jobs`]).
//!
//! # CLI Usage
//!
//! ```bash
//! # Sync every stream in the file
//! warehouse-sync sync --config pipeline.yaml
//!
//! # Inspect or reset a stream's bookmark
//! warehouse-sync bookmark show --config pipeline.yaml --stream orders
//! warehouse-sync bookmark set --config pipeline.yaml --stream orders --value "2024-01-01 00:00:00"
//!
//! # Trigger a Stitch extraction and wait for it
//! warehouse-sync stitch run --config pipeline.yaml --source-id 12345 --timeout 1h
//! ```

pub mod config;
pub mod jobs;
pub mod pipeline;

pub use config::{parse_duration, PipelineConfig, StreamConfig};

/// Install aws-lc-rs as the process-wide rustls provider.
///
/// Safe to call more than once; later calls keep the installed provider.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
