//! Shared ingestion state and the live filtered view.
//!
//! [`LogHub`] owns the record store, the identity sets, the current filter
//! criteria and the published view. Every mutation that can change the
//! visible records ends with a full re-evaluation of the criteria, so the
//! view published through [`LogHub::subscribe_logs`] always matches the
//! current conjunction.
//!
//! Locking: `write_gate` serializes store mutations together with their
//! identity updates. The user and process setters take it too, since they
//! rebuild identity lists from a store scan. `criteria` guards the selection
//! plus the evaluate-and-publish step. The gate is always taken before the
//! criteria.

use std::sync::Arc;

use devlog_store::{
    FilterCriteria, FilterEngine, LevelFilter, LogRecord, NewRecord, Result as StoreResult,
    SharedRecordStore,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use crate::identity::IdentityTracker;
use crate::observable::ObservableList;

/// Capacity of the ingested-record stream.
const RECORD_BUFFER: usize = 1024;

/// The current filtered view.
pub type LogView = Arc<Vec<LogRecord>>;

/// Ingestion state shared by every session and the observer.
pub struct LogHub {
    store: SharedRecordStore,
    engine: FilterEngine,
    identities: IdentityTracker,
    criteria: Mutex<FilterCriteria>,
    write_gate: Mutex<()>,
    view: watch::Sender<LogView>,
    records: broadcast::Sender<LogRecord>,
}

impl std::fmt::Debug for LogHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHub")
            .field("identities", &self.identities)
            .field("criteria", &*self.criteria.lock())
            .field("visible", &self.view.borrow().len())
            .finish_non_exhaustive()
    }
}

impl LogHub {
    /// Creates a hub with neutral criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created or the store cannot
    /// be scanned.
    pub fn new(store: SharedRecordStore) -> StoreResult<Self> {
        Self::with_criteria(store, FilterCriteria::default())
    }

    /// Creates a hub with an initial selection.
    ///
    /// The identity sets are seeded from the records already stored, then
    /// narrowed to the selected user and process.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created or the store cannot
    /// be scanned.
    pub fn with_criteria(store: SharedRecordStore, criteria: FilterCriteria) -> StoreResult<Self> {
        store.create_schema()?;

        let identities = IdentityTracker::new();
        identities.seed_from(store.as_ref())?;
        if criteria.user.is_some() {
            identities.processes().replace(IdentityTracker::processes_of_user(
                store.as_ref(),
                criteria.user.as_deref(),
            )?);
        }
        if criteria.process.is_some() {
            identities.tags().replace(IdentityTracker::tags_of_process(
                store.as_ref(),
                criteria.user.as_deref(),
                criteria.process.as_deref(),
            )?);
        }

        let engine = FilterEngine::new();
        let initial = engine.evaluate(store.as_ref(), &criteria)?;
        info!(
            records = initial.len(),
            users = identities.users().len(),
            "Log hub ready"
        );

        let (view, _) = watch::channel(Arc::new(initial));
        let (records, _) = broadcast::channel(RECORD_BUFFER);

        Ok(Self {
            store,
            engine,
            identities,
            criteria: Mutex::new(criteria),
            write_gate: Mutex::new(()),
            view,
            records,
        })
    }

    /// The underlying record store.
    #[must_use]
    pub const fn store(&self) -> &SharedRecordStore {
        &self.store
    }

    /// The identity tracker.
    #[must_use]
    pub const fn identities(&self) -> &IdentityTracker {
        &self.identities
    }

    /// Known users.
    #[must_use]
    pub const fn users(&self) -> &ObservableList {
        self.identities.users()
    }

    /// Known processes, narrowed to the selected user once one is chosen.
    #[must_use]
    pub const fn processes(&self) -> &ObservableList {
        self.identities.processes()
    }

    /// Known tags, narrowed to the selected process once one is chosen.
    #[must_use]
    pub const fn tags(&self) -> &ObservableList {
        self.identities.tags()
    }

    /// The current filtered view.
    #[must_use]
    pub fn logs(&self) -> LogView {
        self.view.borrow().clone()
    }

    /// Subscribes to view replacements.
    #[must_use]
    pub fn subscribe_logs(&self) -> watch::Receiver<LogView> {
        self.view.subscribe()
    }

    /// Subscribes to every newly stored record, regardless of criteria.
    #[must_use]
    pub fn subscribe_records(&self) -> broadcast::Receiver<LogRecord> {
        self.records.subscribe()
    }

    /// A copy of the current criteria.
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        self.criteria.lock().clone()
    }

    /// Selects a user and narrows the process list to that user's processes.
    ///
    /// Selecting the current user again does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_user(&self, user: Option<String>) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        let mut criteria = self.criteria.lock();
        if criteria.user == user {
            return Ok(());
        }
        self.apply_user(&mut criteria, user)?;
        self.publish(&criteria)
    }

    /// Selects a process and narrows the tag list to its tags.
    ///
    /// Selecting the current process again does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_process(&self, process: Option<String>) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        let mut criteria = self.criteria.lock();
        if criteria.process == process {
            return Ok(());
        }
        self.apply_process(&mut criteria, process)?;
        self.publish(&criteria)
    }

    /// Selects a level.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_level(&self, level: impl Into<LevelFilter>) -> StoreResult<()> {
        let level = level.into();
        let mut criteria = self.criteria.lock();
        if criteria.level == level {
            return Ok(());
        }
        criteria.level = level;
        self.publish(&criteria)
    }

    /// Sets the tag search text. Blank text removes the constraint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn set_search(&self, search: Option<String>) -> StoreResult<()> {
        let mut criteria = self.criteria.lock();
        if criteria.search == search {
            return Ok(());
        }
        criteria.search = search;
        self.publish(&criteria)
    }

    /// Selects a newly identified device and its process in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn select_identity(&self, user: &str, process: Option<&str>) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        let mut criteria = self.criteria.lock();
        let user = Some(user.to_string());
        let process = process.map(str::to_string);
        if criteria.user == user && criteria.process == process {
            return Ok(());
        }
        if criteria.user != user {
            self.apply_user(&mut criteria, user)?;
        }
        self.apply_process(&mut criteria, process)?;
        self.publish(&criteria)
    }

    /// Stores a record, updates the identity sets and re-runs the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the record. Nothing changes in
    /// that case.
    pub fn ingest(&self, record: NewRecord) -> StoreResult<LogRecord> {
        let _gate = self.write_gate.lock();

        let stored = self.store.insert(record).inspect_err(|e| {
            error!(error = %e, "Failed to store log record");
        })?;
        self.identities.observe(&stored);
        debug!(id = %stored.id, device = %stored.user_id, tag = %stored.tag, "Record stored");

        self.refresh()?;
        let _ = self.records.send(stored.clone());
        Ok(stored)
    }

    /// Removes every record and empties the identity sets.
    ///
    /// The criteria are kept, so the view becomes empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to clear.
    pub fn delete_all(&self) -> StoreResult<()> {
        let _gate = self.write_gate.lock();

        self.store.delete_all().inspect_err(|e| {
            error!(error = %e, "Failed to delete log records");
        })?;
        self.identities.clear();
        info!("All log records deleted");

        self.refresh()
    }

    /// Re-runs the current criteria and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn refresh(&self) -> StoreResult<()> {
        let criteria = self.criteria.lock();
        self.publish(&criteria)
    }

    fn apply_user(&self, criteria: &mut FilterCriteria, user: Option<String>) -> StoreResult<()> {
        let processes = IdentityTracker::processes_of_user(self.store.as_ref(), user.as_deref())?;
        self.identities.processes().replace(processes);
        criteria.user = user;
        Ok(())
    }

    fn apply_process(
        &self,
        criteria: &mut FilterCriteria,
        process: Option<String>,
    ) -> StoreResult<()> {
        let tags = IdentityTracker::tags_of_process(
            self.store.as_ref(),
            criteria.user.as_deref(),
            process.as_deref(),
        )?;
        self.identities.tags().replace(tags);
        criteria.process = process;
        Ok(())
    }

    /// Evaluates `criteria` and replaces the view. Callers hold the
    /// criteria lock.
    fn publish(&self, criteria: &FilterCriteria) -> StoreResult<()> {
        let records = self
            .engine
            .evaluate(self.store.as_ref(), criteria)
            .inspect_err(|e| error!(error = %e, "Failed to evaluate log filter"))?;
        debug!(visible = records.len(), "Log view refreshed");
        self.view.send_replace(Arc::new(records));
        Ok(())
    }
}
