//! Traits for record storage backends.
//!
//! This module provides the [`RecordStore`] trait for abstracting over
//! the in-memory and file-backed stores.

use std::sync::Arc;

use crate::error::Result;
use crate::filter::Predicate;
use crate::types::{LogRecord, NewRecord};

/// Trait for record storage backends.
///
/// Every method is one atomic unit: a concurrent reader never observes a
/// partially applied insert or clear. Results are always in insertion order.
pub trait RecordStore: Send + Sync {
    /// Ensures the backing storage exists. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    fn create_schema(&self) -> Result<()>;

    /// Assigns an id to `record`, persists it and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted. Nothing is
    /// stored in that case.
    fn insert(&self, record: NewRecord) -> Result<LogRecord>;

    /// Returns every stored record.
    fn all(&self) -> Result<Vec<LogRecord>>;

    /// Returns the stored records matching `predicate`.
    fn find(&self, predicate: &Predicate) -> Result<Vec<LogRecord>>;

    /// Removes every stored record.
    fn delete_all(&self) -> Result<()>;

    /// Returns the number of stored records.
    fn len(&self) -> Result<usize> {
        self.all().map(|records| records.len())
    }

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }
}

/// Shared handle to a record store.
pub type SharedRecordStore = Arc<dyn RecordStore>;
