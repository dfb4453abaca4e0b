//! Filter composition and evaluation.
//!
//! This module provides:
//! - [`Clause`] — A single constraint on one record field
//! - [`Predicate`] — A conjunction of clauses; empty matches everything
//! - [`FilterCriteria`] — The (user, process, level, search) selection
//! - [`FilterEngine`] — Runs criteria against a [`RecordStore`]
//!
//! Neutral criteria fields contribute no clause at all, so every combination
//! of present and absent fields folds to a well-defined predicate.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::RecordStore;
use crate::types::{LevelFilter, LogLevel, LogRecord};

/// A single constraint on one record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clause {
    /// `user_id == value`
    User(String),
    /// `process_name == value`
    Process(String),
    /// `log_level == value`
    Level(LogLevel),
    /// `tag` contains `value` anywhere, case-sensitive
    TagContains(String),
}

impl Clause {
    /// Checks a record against this clause.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Self::User(user) => record.user_id == *user,
            Self::Process(process) => record.process_name == *process,
            Self::Level(level) => record.log_level == *level,
            Self::TagContains(needle) => record.tag.contains(needle.as_str()),
        }
    }
}

/// A conjunction of clauses.
///
/// The empty conjunction is the identity and matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Creates a predicate that matches every record.
    #[must_use]
    pub const fn match_all() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Adds a clause to the conjunction.
    #[must_use]
    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Adds a clause if one is given.
    #[must_use]
    pub fn and_maybe(self, clause: Option<Clause>) -> Self {
        match clause {
            Some(clause) => self.and(clause),
            None => self,
        }
    }

    /// Returns true if this predicate has no clauses.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the clauses of this conjunction.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Checks a record against every clause.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }
}

impl FromIterator<Clause> for Predicate {
    fn from_iter<I: IntoIterator<Item = Clause>>(iter: I) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<Option<Clause>> for Predicate {
    fn from_iter<I: IntoIterator<Item = Option<Clause>>>(iter: I) -> Self {
        iter.into_iter().fold(Self::match_all(), Self::and_maybe)
    }
}

/// The current filter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Selected device, if any
    pub user: Option<String>,
    /// Selected process, if any
    pub process: Option<String>,
    /// Selected level; `All` means unconstrained
    #[serde(default)]
    pub level: LevelFilter,
    /// Tag search text; blank means unconstrained
    pub search: Option<String>,
}

impl FilterCriteria {
    /// Creates criteria with every field neutral.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the selected user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the selected process.
    #[must_use]
    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Sets the selected level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<LevelFilter>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the tag search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Returns true if no field constrains the result.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.to_predicate().is_match_all()
    }

    /// Folds the present fields into a conjunction.
    ///
    /// Blank search text is treated the same as no search text.
    #[must_use]
    pub fn to_predicate(&self) -> Predicate {
        [
            self.user.clone().map(Clause::User),
            self.process.clone().map(Clause::Process),
            self.level.level().map(Clause::Level),
            self.search
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| Clause::TagContains(s.to_string())),
        ]
        .into_iter()
        .collect()
    }
}

/// Runs filter criteria against a record store.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine;

impl FilterEngine {
    /// Creates a new filter engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the records matching `criteria`, in insertion order.
    ///
    /// Neutral criteria take the full-scan path without evaluating any
    /// per-record predicate.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub fn evaluate<S>(&self, store: &S, criteria: &FilterCriteria) -> Result<Vec<LogRecord>>
    where
        S: RecordStore + ?Sized,
    {
        let predicate = criteria.to_predicate();
        if predicate.is_match_all() {
            return store.all();
        }
        store.find(&predicate)
    }
}
