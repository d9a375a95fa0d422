//! PostgreSQL target for warehouse-sync.
//!
//! Every load runs in one transaction:
//!
//! - **append**: multi-row `INSERT`
//! - **merge**: the batch is staged in a temporary table shaped `LIKE` the
//!   target, then moved with `INSERT … SELECT … ON CONFLICT (key) DO UPDATE`
//! - **replace**: `TRUNCATE` followed by `INSERT`
//!
//! The merge key must be covered by a unique index or primary key on the
//! target table, as `ON CONFLICT` requires.

mod client;
mod loader;
pub mod statements;
mod value;

pub use client::{new_postgresql_client, PostgresConfig, SharedClient};
pub use loader::{MergeOptions, PostgresLoader};
pub use value::PgValue;
