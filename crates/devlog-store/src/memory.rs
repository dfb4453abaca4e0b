//! In-memory record storage.
//!
//! [`MemoryRecordStore`] keeps every record in a single vector behind one
//! lock. Id assignment happens under the same write lock as the push, so ids
//! and vector order always agree.

use parking_lot::RwLock;

use crate::error::Result;
use crate::filter::Predicate;
use crate::traits::RecordStore;
use crate::types::{LogRecord, NewRecord, RecordId};

#[derive(Debug)]
struct Inner {
    records: Vec<LogRecord>,
    next_id: u64,
}

/// Thread-safe in-memory record store.
#[derive(Debug)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Creates a store pre-populated with `records`, keeping their ids.
    ///
    /// Records must already be in ascending id order.
    #[must_use]
    pub fn from_records(records: Vec<LogRecord>) -> Self {
        let next_id = records.last().map_or(1, |r| r.id.0 + 1);
        Self {
            inner: RwLock::new(Inner { records, next_id }),
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn create_schema(&self) -> Result<()> {
        Ok(())
    }

    fn insert(&self, record: NewRecord) -> Result<LogRecord> {
        let mut inner = self.inner.write();
        let stored = record.into_record(RecordId(inner.next_id));
        inner.next_id += 1;
        inner.records.push(stored.clone());
        Ok(stored)
    }

    fn all(&self) -> Result<Vec<LogRecord>> {
        Ok(self.inner.read().records.clone())
    }

    fn find(&self, predicate: &Predicate) -> Result<Vec<LogRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .iter()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect())
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.write().records.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().records.len())
    }
}
