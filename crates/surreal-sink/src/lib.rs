//! SurrealDB target for warehouse-sync.
//!
//! - **append**: one `INSERT` of the whole batch, with generated record ids
//! - **merge**: one transaction that `UPSERT`s each record at
//!   `table:⟨key⟩` with `MERGE` content; composite keys become array ids
//! - **replace**: one transaction that deletes the table contents and inserts
//!   the batch

mod connect;
mod loader;
mod value;

pub use connect::{surreal_connect, surreal_connect_with_retries, SurrealClient, SurrealConfig};
pub use loader::SurrealLoader;
pub use value::{key_to_id, record_to_object, to_surreal};
