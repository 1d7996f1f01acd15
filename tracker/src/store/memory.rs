//! In-memory store for tests and embedders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::post::PostRecord;

use super::{Store, StoreError};

/// HashMap-backed store with the same call contract as the file store.
///
/// Counts successful writes so tests can assert how many times a record
/// actually hit storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, PostRecord>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create/overwrite calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(id).cloned())
    }

    fn create(&self, record: &PostRecord, overwrite: bool) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        if !overwrite && records.contains_key(&record.id) {
            return Ok(false);
        }

        records.insert(record.id.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
