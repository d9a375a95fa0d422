//! Bookmark management for warehouse-sync
//!
//! A bookmark is the high-water mark of the last successful sync of a stream:
//! the largest value of the stream's watermark column that has been durably
//! loaded into the target. The next sync only extracts rows above it.
//!
//! # Architecture
//!
//! - [`Watermark`] / [`WatermarkKind`] define the comparable scalar and its
//!   single-line text encoding (the persisted bookmark format)
//! - [`BookmarkStore`] abstracts the durable key/value backend
//! - [`Bookmarks`] is the typed facade used by the sync engine; it parses
//!   stored values and refuses to move a bookmark backwards
//!
//! ## Storage Backends
//!
//! - `S3Store` - One S3 object per stream
//! - `FilesystemStore` - One file per stream, replaced atomically
//! - `MemoryStore` - Process-local map for tests and dry runs
//!
//! There is no locking across processes: running two syncs of the same
//! stream concurrently can interleave their bookmark writes.

mod filesystem;
mod manager;
mod memory;
mod s3;
pub mod store;
mod watermark;

#[cfg(test)]
mod tests;

pub use filesystem::FilesystemStore;
pub use manager::{Advance, Bookmarks};
pub use memory::MemoryStore;
pub use s3::S3Store;
pub use store::{validate_stream_id, BookmarkStore};
pub use watermark::{parse_timestamp, Watermark, WatermarkKind, TIMESTAMP_FORMAT};
