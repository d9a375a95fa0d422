//! In-memory warehouse and target.
//!
//! These implement [`Warehouse`] and [`Loader`] without any external service
//! and support failure injection, so the engine's state machine can be
//! exercised end to end.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::extract::Warehouse;
use crate::load::{dedupe_by_key, key_values, LoadMode, Loader};
use crate::values::{Record, TargetRecord};

/// A warehouse returning a fixed result set and recording every query.
#[derive(Default)]
pub struct MemoryWarehouse {
    rows: Mutex<Vec<Record>>,
    queries: Mutex<Vec<String>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryWarehouse {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub async fn set_rows(&self, rows: Vec<Record>) {
        *self.rows.lock().await = rows;
    }

    /// Queries executed so far, oldest first.
    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }

    /// Make the next `execute` fail with an extraction error.
    pub async fn fail_next_with(&self, message: impl Into<String>) {
        *self.fail_next.lock().await = Some(message.into());
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn execute(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        self.queries.lock().await.push(query.to_string());
        if let Some(message) = self.fail_next.lock().await.take() {
            return Err(SyncError::extraction(message));
        }
        Ok(self.rows.lock().await.clone())
    }
}

/// A single in-memory table.
pub struct MemoryTarget {
    mode: LoadMode,
    rows: Mutex<Vec<TargetRecord>>,
    fail_loads: AtomicBool,
    load_calls: AtomicUsize,
}

impl MemoryTarget {
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            rows: Mutex::new(Vec::new()),
            fail_loads: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
        }
    }

    pub async fn seed(&self, rows: Vec<TargetRecord>) {
        *self.rows.lock().await = rows;
    }

    /// Current table contents.
    pub async fn rows(&self) -> Vec<TargetRecord> {
        self.rows.lock().await.clone()
    }

    /// Make every subsequent `load` fail before touching the table.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of `load` calls, failed ones included.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for MemoryTarget {
    fn mode(&self) -> &LoadMode {
        &self.mode
    }

    async fn load(&self, records: &[TargetRecord]) -> Result<usize, SyncError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::load("target unavailable"));
        }

        let mut table = self.rows.lock().await;
        // Work on a copy so a failing record leaves the table untouched.
        let mut next = table.clone();
        match &self.mode {
            LoadMode::Append => next.extend_from_slice(records),
            LoadMode::Replace => next = records.to_vec(),
            LoadMode::Merge { key } => {
                for record in dedupe_by_key(records, key)? {
                    let incoming = key_values(&record, key)?;
                    let existing = next
                        .iter()
                        .position(|row| key_values(row, key).ok().as_ref() == Some(&incoming));
                    match existing {
                        Some(index) => {
                            for (field, value) in record.iter() {
                                next[index].insert(field, value.clone());
                            }
                        }
                        None => next.push(record),
                    }
                }
            }
        }
        *table = next;
        Ok(records.len())
    }
}
