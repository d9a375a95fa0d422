//! Bookmark storage trait
//!
//! This module defines the BookmarkStore trait for backend-agnostic bookmark
//! storage. A backend persists one single-line text value per stream id;
//! interpreting that value is the job of [`crate::Bookmarks`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for bookmark storage operations.
///
/// This trait abstracts the storage backend so the same sync logic works with:
/// - S3 objects (`S3Store`)
/// - Local files (`FilesystemStore`)
/// - An in-process map (`MemoryStore`)
///
/// A successful `store_bookmark` must be durable: a later `read_bookmark` for
/// the same stream, from any process, returns the stored value.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Read the stored bookmark text for a stream.
    ///
    /// Returns None if no bookmark has been stored yet.
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>>;

    /// Replace the stored bookmark text for a stream.
    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl<T: BookmarkStore + ?Sized> BookmarkStore for &T {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        (**self).read_bookmark(stream_id).await
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        (**self).store_bookmark(stream_id, value).await
    }
}

#[async_trait]
impl<T: BookmarkStore + ?Sized> BookmarkStore for Box<T> {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        (**self).read_bookmark(stream_id).await
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        (**self).store_bookmark(stream_id, value).await
    }
}

#[async_trait]
impl<T: BookmarkStore + ?Sized> BookmarkStore for Arc<T> {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        (**self).read_bookmark(stream_id).await
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        (**self).store_bookmark(stream_id, value).await
    }
}

/// Check that a stream id can be used as a file name or object key segment.
///
/// Allowed characters are ASCII alphanumerics, `_`, `-` and `.`; the id must
/// not be empty and must not start with a dot.
pub fn validate_stream_id(stream_id: &str) -> Result<()> {
    if stream_id.is_empty() {
        anyhow::bail!("Stream id must not be empty");
    }
    if stream_id.starts_with('.') {
        anyhow::bail!("Stream id '{stream_id}' must not start with '.'");
    }
    if let Some(c) = stream_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        anyhow::bail!("Stream id '{stream_id}' contains unsupported character '{c}'");
    }
    Ok(())
}
