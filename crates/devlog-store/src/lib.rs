//! # devlog-store
//!
//! Record storage and the filter engine for devlog.
//!
//! This crate provides:
//!
//! - [`LogRecord`] — Immutable stored log records
//! - [`LogLevel`] / [`LevelFilter`] — Severities and level selection
//! - [`RecordStore`] — Abstract trait for storage backends
//! - [`MemoryRecordStore`] — In-memory storage
//! - [`FileRecordStore`] — Durable JSON-lines storage
//! - [`FilterCriteria`] / [`Predicate`] / [`FilterEngine`] — Query composition
//!
//! ## Example
//!
//! ```rust
//! use devlog_store::{FilterCriteria, FilterEngine, LogLevel, MemoryRecordStore, NewRecord, RecordStore};
//!
//! let store = MemoryRecordStore::new();
//! store.insert(NewRecord::new("dev1", "app", LogLevel::Info, "net", 1_000, "connected"))?;
//! store.insert(NewRecord::new("dev1", "app", LogLevel::Error, "db", 1_001, "timeout"))?;
//!
//! let criteria = FilterCriteria::new().with_user("dev1").with_level(LogLevel::Error);
//! let records = FilterEngine::new().evaluate(&store, &criteria)?;
//! assert_eq!(records.len(), 1);
//! # Ok::<(), devlog_store::StoreError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod file_store;
pub mod filter;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::{Result, StoreError};
pub use file_store::FileRecordStore;
pub use filter::{Clause, FilterCriteria, FilterEngine, Predicate};
pub use memory::MemoryRecordStore;
pub use traits::{RecordStore, SharedRecordStore};
pub use types::{
    LevelFilter, LogLevel, LogRecord, NewRecord, RecordId, MAX_MESSAGE_LEN, MAX_NAME_LEN,
    MAX_TAG_LEN,
};
