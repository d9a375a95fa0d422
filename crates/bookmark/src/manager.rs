//! Typed bookmark access for sync runs.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::store::BookmarkStore;
use crate::watermark::{Watermark, WatermarkKind};

/// Result of [`Bookmarks::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The new watermark was persisted.
    Written,
    /// The new watermark equals the stored one; nothing was written.
    Unchanged,
    /// The new watermark is below the previous one and was not persisted.
    Refused,
}

/// Reads and advances stream bookmarks of a single watermark kind.
pub struct Bookmarks<S> {
    store: S,
    kind: WatermarkKind,
}

impl<S: BookmarkStore> Bookmarks<S> {
    pub fn new(store: S, kind: WatermarkKind) -> Self {
        Self { store, kind }
    }

    pub fn kind(&self) -> WatermarkKind {
        self.kind
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current watermark of a stream, or None if it has never been synced.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable or the stored value does not
    /// parse as this kind.
    pub async fn current(&self, stream_id: &str) -> Result<Option<Watermark>> {
        let Some(raw) = self.store.read_bookmark(stream_id).await? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let watermark = Watermark::parse(self.kind, &raw)
            .with_context(|| format!("Corrupt bookmark for stream '{stream_id}'"))?;
        Ok(Some(watermark))
    }

    /// Persist `next` if it does not move the bookmark backwards.
    ///
    /// `previous` is the watermark the run started from.
    pub async fn advance(
        &self,
        stream_id: &str,
        previous: Option<&Watermark>,
        next: &Watermark,
    ) -> Result<Advance> {
        if next.kind() != self.kind {
            anyhow::bail!(
                "Watermark {next} for stream '{stream_id}' is {}, bookmark kind is {}",
                next.kind(),
                self.kind
            );
        }
        match previous {
            Some(prev) if next < prev => {
                warn!("Refusing to move bookmark of '{stream_id}' back from {prev} to {next}");
                return Ok(Advance::Refused);
            }
            Some(prev) if next == prev => return Ok(Advance::Unchanged),
            _ => {}
        }
        self.store
            .store_bookmark(stream_id, &next.to_bookmark_string())
            .await?;
        info!("Advanced bookmark of '{stream_id}' to {next}");
        Ok(Advance::Written)
    }

    /// Unconditionally replace a stream's bookmark (operator override).
    pub async fn overwrite(&self, stream_id: &str, value: &Watermark) -> Result<()> {
        if value.kind() != self.kind {
            anyhow::bail!("Watermark {value} is {}, bookmark kind is {}", value.kind(), self.kind);
        }
        self.store
            .store_bookmark(stream_id, &value.to_bookmark_string())
            .await
    }
}
