//! Core of the warehouse-sync replication engine.
//!
//! This crate owns everything between "read the bookmark" and "advance the
//! bookmark":
//!
//! - [`SyncValue`] / [`Record`] / [`TargetRecord`] - Row representations
//! - [`rewrite`] - Adds the `column > bookmark` predicate to a source query
//! - [`Warehouse`] / [`extract`] - Runs the query and computes the batch's max watermark
//! - [`RowTransformer`] - Maps source columns to target fields
//! - [`Loader`] / [`LoadMode`] - Append, merge and replace writes into a target
//! - [`IncrementalSync`] - The read → rewrite → extract → transform → load → advance state machine
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── bookmark                        (watermarks and their durable stores)
//!    │
//!    ├─── warehouse-sync-snowflake        (implements Warehouse)
//!    ├─── warehouse-sync-postgresql-sink  (implements Loader)
//!    └─── warehouse-sync-surreal-sink     (implements Loader)
//! ```
//!
//! The in-memory [`MemoryWarehouse`] and [`MemoryTarget`] implement the same
//! traits and back the engine's tests.

pub mod error;
pub mod extract;
pub mod load;
pub mod memory;
pub mod rewrite;
pub mod sync;
pub mod transform;
pub mod values;

pub use error::{SyncError, TransformError};
pub use extract::{extract, max_watermark, ExtractionBatch, IncrementalConfig, Warehouse};
pub use load::{dedupe_by_key, key_values, LoadMode, Loader};
pub use memory::{MemoryTarget, MemoryWarehouse};
pub use rewrite::rewrite;
pub use sync::{IncrementalSync, StreamDefinition, SyncOutcome};
pub use transform::{ColumnFormat, RowTransformer, TransformConfig, TtlConfig};
pub use values::{Record, SyncValue, TargetRecord};
