//! Known devices, processes and tags.

use devlog_store::{Clause, LogRecord, Predicate, RecordStore, Result as StoreResult};

use crate::observable::ObservableList;

/// Tracks the users (devices), processes and tags seen so far.
///
/// Each set is an [`ObservableList`] in first-seen order.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    users: ObservableList,
    processes: ObservableList,
    tags: ObservableList,
}

impl IdentityTracker {
    /// Creates a tracker with empty sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Known users.
    #[must_use]
    pub const fn users(&self) -> &ObservableList {
        &self.users
    }

    /// Known processes.
    #[must_use]
    pub const fn processes(&self) -> &ObservableList {
        &self.processes
    }

    /// Known tags.
    #[must_use]
    pub const fn tags(&self) -> &ObservableList {
        &self.tags
    }

    /// Adds a user; returns false if it was already known.
    pub fn add_user(&self, user: &str) -> bool {
        self.users.add(user)
    }

    /// Adds a process; returns false if it was already known.
    pub fn add_process(&self, process: &str) -> bool {
        self.processes.add(process)
    }

    /// Adds a tag; returns false if it was already known.
    pub fn add_tag(&self, tag: &str) -> bool {
        self.tags.add(tag)
    }

    /// Records the identities carried by a freshly stored record.
    ///
    /// An empty process name means the device never announced one and is
    /// not added.
    pub fn observe(&self, record: &LogRecord) {
        self.add_user(&record.user_id);
        if !record.process_name.is_empty() {
            self.add_process(&record.process_name);
        }
        self.add_tag(&record.tag);
    }

    /// Empties all three sets.
    pub fn clear(&self) {
        self.users.clear();
        self.processes.clear();
        self.tags.clear();
    }

    /// Rebuilds all three sets from the records already in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn seed_from<S>(&self, store: &S) -> StoreResult<()>
    where
        S: RecordStore + ?Sized,
    {
        let records = store.all()?;
        self.users.replace(distinct(&records, |r| &r.user_id));
        self.processes.replace(
            distinct(&records, |r| &r.process_name)
                .into_iter()
                .filter(|p| !p.is_empty()),
        );
        self.tags.replace(distinct(&records, |r| &r.tag));
        Ok(())
    }

    /// Returns the distinct processes logged by `user`, in first-seen order.
    ///
    /// Returns an empty list when no user is given. Records without a
    /// process are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn processes_of_user<S>(store: &S, user: Option<&str>) -> StoreResult<Vec<String>>
    where
        S: RecordStore + ?Sized,
    {
        let Some(user) = user else {
            return Ok(Vec::new());
        };
        let records = store.find(&Predicate::match_all().and(Clause::User(user.to_string())))?;
        Ok(distinct(&records, |r| &r.process_name)
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect())
    }

    /// Returns the distinct tags logged by `process` of `user`, in
    /// first-seen order.
    ///
    /// Returns an empty list unless both are given.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn tags_of_process<S>(
        store: &S,
        user: Option<&str>,
        process: Option<&str>,
    ) -> StoreResult<Vec<String>>
    where
        S: RecordStore + ?Sized,
    {
        let (Some(user), Some(process)) = (user, process) else {
            return Ok(Vec::new());
        };
        let predicate = Predicate::match_all()
            .and(Clause::User(user.to_string()))
            .and(Clause::Process(process.to_string()));
        let records = store.find(&predicate)?;
        Ok(distinct(&records, |r| &r.tag))
    }
}

/// Distinct values of one field, in first-seen order.
fn distinct<F>(records: &[LogRecord], field: F) -> Vec<String>
where
    F: Fn(&LogRecord) -> &String,
{
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .map(field)
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}
