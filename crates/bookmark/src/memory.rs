//! In-process bookmark storage.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::store::BookmarkStore;

/// Map-backed BookmarkStore. Values live as long as the store does.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored value.
    pub async fn insert(&self, stream_id: &str, value: impl Into<String>) {
        self.values
            .lock()
            .await
            .insert(stream_id.to_string(), value.into());
    }

    /// Make every subsequent `store_bookmark` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookmarkStore for MemoryStore {
    async fn read_bookmark(&self, stream_id: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(stream_id).cloned())
    }

    async fn store_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Bookmark store unavailable");
        }
        self.values
            .lock()
            .await
            .insert(stream_id.to_string(), value.to_string());
        Ok(())
    }
}
