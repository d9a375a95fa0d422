//! Filesystem-based bookmark storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::store::{validate_stream_id, BookmarkStore};

/// Filesystem implementation of BookmarkStore trait.
///
/// Stores each stream's bookmark as `{dir}/{stream_id}.bookmark`. Writes go to
/// a temporary sibling first and are renamed into place, so a reader never
/// observes a half-written value.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, stream_id: &str) -> Result<PathBuf> {
        validate_stream_id(stream_id)?;
        Ok(self.dir.join(format!("{stream_id}.bookmark")))
    }
}

#[async_trait]
impl BookmarkStore for FilesystemStore {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        let path = self.path_for(stream_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read bookmark {}", path.display()))
            }
        }
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        let path = self.path_for(stream_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create bookmark dir {}", self.dir.display()))?;

        let tmp = self.dir.join(format!(".{stream_id}.bookmark.tmp"));
        tokio::fs::write(&tmp, format!("{value}\n"))
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move bookmark into {}", path.display()))?;

        tracing::debug!("Stored bookmark {value} to {}", path.display());
        Ok(())
    }
}
