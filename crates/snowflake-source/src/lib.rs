//! Snowflake source for warehouse-sync.
//!
//! Talks to Snowflake's REST endpoints directly with `reqwest`:
//!
//! 1. `POST /session/v1/login-request` exchanges login and password for a
//!    session token
//! 2. `POST /queries/v1/query-request` runs a statement; long-running
//!    statements are followed through `getResultUrl`
//! 3. Large results are split into chunks that are downloaded separately
//!
//! Results are requested in JSON row format and every cell is decoded by its
//! column's `rowtype` into a [`sync_core::SyncValue`].

mod client;
mod config;
mod decode;
mod protocol;

pub use client::SnowflakeClient;
pub use config::SnowflakeConfig;
pub use decode::{decode_cell, ColumnType};
