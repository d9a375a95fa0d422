//! The incremental sync state machine.
//!
//! ```text
//! READ_BOOKMARK → REWRITE_QUERY → EXTRACT ─(empty)→ DONE_NOOP
//!                                    │
//!                                    └→ TRANSFORM → LOAD ─(ok)→ ADVANCE_BOOKMARK → DONE
//!                                                     └─(err)→ FAILED (bookmark untouched)
//! ```
//!
//! Nothing is retried here; a failed run is simply run again, and because the
//! bookmark only moves after a successful load, the retry re-extracts the
//! same rows. If the bookmark write itself fails after a successful load, the
//! next run reloads that batch (at-least-once).

use bookmark::{validate_stream_id, Advance, BookmarkStore, Bookmarks, Watermark};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::extract::{extract, IncrementalConfig, Warehouse};
use crate::load::{LoadMode, Loader};
use crate::rewrite::rewrite;
use crate::transform::RowTransformer;

/// A logical source → target pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: String,
    pub query: String,
    /// Watermark column; None runs a full extraction every time.
    #[serde(default)]
    pub incremental: Option<IncrementalConfig>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The extraction returned no rows; nothing was loaded.
    NoOp,
    Loaded {
        rows: usize,
        /// Bookmark the run started from.
        previous: Option<Watermark>,
        /// Max watermark of the loaded batch.
        watermark: Option<Watermark>,
        /// Whether the bookmark store was written.
        advanced: bool,
    },
}

/// One stream wired to its source, transformer, target and bookmark store.
pub struct IncrementalSync<W, L, S> {
    stream: StreamDefinition,
    warehouse: W,
    transformer: RowTransformer,
    loader: L,
    store: S,
}

impl<W, L, S> IncrementalSync<W, L, S>
where
    W: Warehouse,
    L: Loader,
    S: BookmarkStore,
{
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for an unusable stream id, a merge mode
    /// without a key, or a replace-mode target on an incremental stream
    /// (replacing the table with only the rows above the bookmark would drop
    /// everything older).
    pub fn new(
        stream: StreamDefinition,
        warehouse: W,
        transformer: RowTransformer,
        loader: L,
        store: S,
    ) -> Result<Self, SyncError> {
        loader.mode().validate()?;
        if stream.incremental.is_some() {
            validate_stream_id(&stream.id).map_err(|e| SyncError::Config(format!("{e:#}")))?;
            if *loader.mode() == LoadMode::Replace {
                return Err(SyncError::Config(format!(
                    "stream '{}' is incremental; replace mode needs a full extraction",
                    stream.id
                )));
            }
        }
        Ok(Self {
            stream,
            warehouse,
            transformer,
            loader,
            store,
        })
    }

    pub fn stream(&self) -> &StreamDefinition {
        &self.stream
    }

    /// Run the stream once.
    pub async fn run(&self) -> Result<SyncOutcome, SyncError> {
        let stream_id = self.stream.id.as_str();
        let bookmarks = self
            .stream
            .incremental
            .as_ref()
            .map(|config| (config, Bookmarks::new(&self.store, config.kind)));

        let previous = match &bookmarks {
            Some((_, bookmarks)) => bookmarks
                .current(stream_id)
                .await
                .map_err(SyncError::Bookmark)?,
            None => None,
        };
        info!(
            "Stream '{stream_id}': starting from bookmark {}",
            previous
                .as_ref()
                .map_or_else(|| "none (full load)".to_string(), |w| w.to_string())
        );

        let query = match &bookmarks {
            Some((config, _)) => rewrite(&self.stream.query, &config.column, previous.as_ref()),
            None => self.stream.query.clone(),
        };
        let batch = extract(
            &self.warehouse,
            &query,
            bookmarks.as_ref().map(|(config, _)| *config),
        )
        .await?;

        if batch.is_empty() {
            info!("Stream '{stream_id}': no new rows");
            return Ok(SyncOutcome::NoOp);
        }

        let transformer = self
            .transformer
            .clone()
            .with_stamp(Utc::now().naive_utc());
        let records = transformer.transform_all(&batch.rows)?;

        let rows = self.loader.load(&records).await?;
        info!(
            "Stream '{stream_id}': loaded {rows} rows ({})",
            self.loader.mode().name()
        );

        let mut advanced = false;
        if let Some((_, bookmarks)) = &bookmarks {
            match &batch.max_watermark {
                Some(next) => {
                    let result = bookmarks
                        .advance(stream_id, previous.as_ref(), next)
                        .await
                        .map_err(SyncError::Bookmark)?;
                    advanced = result == Advance::Written;
                }
                None => warn!("Stream '{stream_id}': every watermark was NULL; bookmark kept"),
            }
        }

        Ok(SyncOutcome::Loaded {
            rows,
            previous,
            watermark: batch.max_watermark,
            advanced,
        })
    }
}
