//! File-backed record storage.
//!
//! This module provides:
//! - [`FileRecordStore`] — Durable storage as JSON lines with an in-memory mirror
//! - Recovery of records and the id counter when a file is reopened
//! - Implementation of [`RecordStore`]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::filter::Predicate;
use crate::traits::RecordStore;
use crate::types::{LogRecord, NewRecord};

/// Open file plus the records it holds.
struct FileState {
    /// Append handle to the backing file.
    file: File,
    /// Length of the file after the last complete write.
    len: u64,
    /// Mirror of every record in the file, ordered by id.
    records: Vec<LogRecord>,
    /// Next id to assign.
    next_id: u64,
}

/// Fix applied to the end of a file cut short by an interrupted append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailRepair {
    /// Drop the unparsable bytes from this offset on.
    Truncate(u64),
    /// The last record is whole but lacks its newline.
    Terminate,
}

/// Durable record store that writes one JSON object per line.
///
/// The store is unusable until [`RecordStore::create_schema`] has opened the
/// backing file.
pub struct FileRecordStore {
    path: PathBuf,
    state: RwLock<Option<FileState>>,
}

impl std::fmt::Debug for FileRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRecordStore")
            .field("path", &self.path)
            .field("open", &self.state.read().is_some())
            .finish()
    }
}

impl FileRecordStore {
    /// Creates a store for `path` without touching the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(None),
        }
    }

    /// Creates a store for `path` and opens it immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or read back.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        store.create_schema()?;
        Ok(store)
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record from an existing file.
    ///
    /// A last line without its newline is what an interrupted append leaves
    /// behind. If it does not parse it is dropped, otherwise it is kept.
    /// Any other bad line is reported as [`StoreError::Corrupt`].
    fn load(path: &Path) -> Result<(Vec<LogRecord>, Option<TailRepair>)> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), None)),
            Err(e) => return Err(e.into()),
        };

        let mut records: Vec<LogRecord> = Vec::new();
        let mut repair = None;
        let mut offset = 0;
        for (idx, segment) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
            let start = offset;
            offset += segment.len();
            let complete = segment.ends_with(b"\n");
            if segment.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record: LogRecord = match serde_json::from_slice(segment) {
                Ok(record) => record,
                Err(e) if !complete => {
                    warn!(
                        path = %path.display(),
                        line = idx + 1,
                        error = %e,
                        "Dropping torn record at end of file"
                    );
                    repair = Some(TailRepair::Truncate(start as u64));
                    break;
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    });
                }
            };
            if records.last().is_some_and(|last| last.id >= record.id) {
                return Err(StoreError::Corrupt {
                    line: idx + 1,
                    reason: format!("record id {} is not ascending", record.id),
                });
            }
            if !complete {
                repair = Some(TailRepair::Terminate);
            }
            records.push(record);
        }
        Ok((records, repair))
    }
}

impl RecordStore for FileRecordStore {
    fn create_schema(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let (records, repair) = Self::load(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        match repair {
            Some(TailRepair::Truncate(len)) => file.set_len(len)?,
            Some(TailRepair::Terminate) => file.write_all(b"\n")?,
            None => {}
        }
        let len = file.metadata()?.len();
        let next_id = records.last().map_or(1, |r| r.id.0 + 1);

        info!(
            path = %self.path.display(),
            records = records.len(),
            "Record store opened"
        );

        *state = Some(FileState {
            file,
            len,
            records,
            next_id,
        });
        Ok(())
    }

    fn insert(&self, record: NewRecord) -> Result<LogRecord> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(StoreError::SchemaMissing)?;

        let stored = record.into_record(crate::types::RecordId(state.next_id));
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        if let Err(e) = state.file.write_all(line.as_bytes()) {
            // Cut any partial line so the file stays readable.
            if let Err(trunc) = state.file.set_len(state.len) {
                warn!(path = %self.path.display(), error = %trunc, "Failed to roll back partial write");
            }
            return Err(e.into());
        }

        state.len += line.len() as u64;
        state.next_id += 1;
        state.records.push(stored.clone());
        debug!(id = %stored.id, "Record persisted");
        Ok(stored)
    }

    fn all(&self) -> Result<Vec<LogRecord>> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(StoreError::SchemaMissing)?;
        Ok(state.records.clone())
    }

    fn find(&self, predicate: &Predicate) -> Result<Vec<LogRecord>> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(StoreError::SchemaMissing)?;
        Ok(state
            .records
            .iter()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect())
    }

    fn delete_all(&self) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(StoreError::SchemaMissing)?;
        state.file.set_len(0)?;
        state.len = 0;
        state.records.clear();
        info!(path = %self.path.display(), "Record store cleared");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(StoreError::SchemaMissing)?;
        Ok(state.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Clause;
    use crate::types::{LogLevel, RecordId};
    use tempfile::TempDir;

    fn sample(user: &str, tag: &str) -> NewRecord {
        NewRecord::new(user, "p1", LogLevel::Warning, tag, 5, "msg")
    }

    fn store_in(dir: &TempDir) -> FileRecordStore {
        FileRecordStore::new(dir.path().join("nested").join("devlog.jsonl"))
    }

    /// Writes one good record to `path` and returns the file contents.
    fn one_record_file(path: &Path) -> String {
        let store = FileRecordStore::open(path).expect("open store");
        store.insert(sample("dev1", "net")).expect("insert");
        drop(store);
        fs::read_to_string(path).expect("read file")
    }

    #[test]
    fn operations_before_schema_fail() {
        let dir = TempDir::new().expect("create temp dir");
        let store = store_in(&dir);

        assert!(matches!(store.insert(sample("a", "t")), Err(StoreError::SchemaMissing)));
        assert!(matches!(store.all(), Err(StoreError::SchemaMissing)));
        assert!(matches!(store.delete_all(), Err(StoreError::SchemaMissing)));
    }

    #[test]
    fn create_schema_is_idempotent() {
        let dir = TempDir::new().expect("create temp dir");
        let store = store_in(&dir);
        assert!(store.create_schema().is_ok());
        let _ = store.insert(sample("a", "t"));
        assert!(store.create_schema().is_ok());
        assert_eq!(store.len().ok(), Some(1));
        assert!(store.path().exists());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        {
            let store = FileRecordStore::open(&path).expect("open store");
            let _ = store.insert(sample("dev1", "net"));
            let _ = store.insert(sample("dev2", "db"));
        }

        let store = FileRecordStore::open(&path).expect("reopen store");
        let all = store.all().unwrap_or_default();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id, "dev1");
        assert_eq!(all[1].tag, "db");

        let next = store.insert(sample("dev3", "x")).map(|r| r.id).ok();
        assert_eq!(next, Some(RecordId(3)));
    }

    #[test]
    fn delete_all_truncates_file() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        let store = FileRecordStore::open(&path).expect("open store");
        let _ = store.insert(sample("dev1", "net"));
        assert!(store.delete_all().is_ok());
        assert_eq!(fs::metadata(&path).map(|m| m.len()).ok(), Some(0));

        let _ = store.insert(sample("dev2", "db"));
        drop(store);

        let reopened = FileRecordStore::open(&path).expect("reopen store");
        let all = reopened.all().unwrap_or_default();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user_id, "dev2");
    }

    #[test]
    fn find_uses_predicate() {
        let dir = TempDir::new().expect("create temp dir");
        let store = FileRecordStore::open(dir.path().join("devlog.jsonl")).expect("open store");
        let _ = store.insert(sample("dev1", "net"));
        let _ = store.insert(sample("dev1", "db"));

        let predicate = Predicate::match_all().and(Clause::TagContains("d".into()));
        let found = store.find(&predicate).unwrap_or_default();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag, "db");
    }

    #[test]
    fn corrupt_line_is_reported() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        fs::write(&path, "{\"not\":\"a record\"}\n").expect("write file");

        let result = FileRecordStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { line: 1, .. })));
    }

    #[test]
    fn torn_last_line_is_dropped_on_open() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        let good = one_record_file(&path);
        fs::write(&path, format!("{good}{{\"id\":2,\"user_id\":\"dev1\",\"process_na"))
            .expect("write torn tail");

        let store = FileRecordStore::open(&path).expect("torn tail is recovered");
        assert_eq!(store.len().ok(), Some(1));
        assert_eq!(fs::read_to_string(&path).ok(), Some(good));

        let next = store.insert(sample("dev2", "db")).map(|r| r.id).ok();
        assert_eq!(next, Some(RecordId(2)));
        drop(store);

        let reopened = FileRecordStore::open(&path).expect("reopen store");
        let users: Vec<_> = reopened
            .all()
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(users, vec!["dev1", "dev2"]);
    }

    #[test]
    fn torn_line_in_the_middle_is_corrupt() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        let good = one_record_file(&path);
        fs::write(&path, format!("{good}{{\"id\":2,\"user\n{good}")).expect("write file");

        let result = FileRecordStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { line: 2, .. })));
    }

    #[test]
    fn whole_last_record_without_newline_is_kept() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("devlog.jsonl");
        let good = one_record_file(&path);
        fs::write(&path, good.trim_end()).expect("write file");

        let store = FileRecordStore::open(&path).expect("open store");
        assert_eq!(store.len().ok(), Some(1));
        let _ = store.insert(sample("dev2", "db"));
        drop(store);

        let reopened = FileRecordStore::open(&path).expect("reopen store");
        assert_eq!(reopened.len().ok(), Some(2));
    }
}
