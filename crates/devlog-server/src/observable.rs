//! Change-notifying sequences for observers.
//!
//! [`ObservableList`] is an insertion-ordered set of strings. Readers take a
//! snapshot of the current value and subscribe to [`ListChange`] events.
//! Events are sent while the write lock is held, so every subscriber sees
//! them in the same order as the mutations.

use std::collections::HashSet;

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Default capacity of the change channel.
const DEFAULT_CHANGE_BUFFER: usize = 256;

/// A change to an [`ObservableList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    /// A new item was appended.
    Added(String),
    /// The whole content was replaced.
    Replaced(Vec<String>),
    /// The list was emptied.
    Cleared,
}

#[derive(Debug, Default)]
struct ListInner {
    items: Vec<String>,
    seen: HashSet<String>,
}

/// Insertion-ordered set of unique strings with change notification.
#[derive(Debug)]
pub struct ObservableList {
    inner: RwLock<ListInner>,
    changes: broadcast::Sender<ListChange>,
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_BUFFER);
        Self {
            inner: RwLock::new(ListInner::default()),
            changes,
        }
    }

    /// Appends `item` unless it is already present.
    ///
    /// Returns true and notifies subscribers only if the item was new.
    pub fn add(&self, item: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.seen.contains(item) {
            return false;
        }
        inner.seen.insert(item.to_string());
        inner.items.push(item.to_string());
        let _ = self.changes.send(ListChange::Added(item.to_string()));
        true
    }

    /// Replaces the content, keeping the first occurrence of duplicates.
    pub fn replace(&self, items: impl IntoIterator<Item = String>) {
        let mut next = ListInner::default();
        for item in items {
            if next.seen.insert(item.clone()) {
                next.items.push(item);
            }
        }

        let mut inner = self.inner.write();
        let snapshot = next.items.clone();
        *inner = next;
        let _ = self.changes.send(ListChange::Replaced(snapshot));
    }

    /// Removes every item. Subscribers are notified only if the list was
    /// non-empty.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        if inner.items.is_empty() {
            return;
        }
        inner.items.clear();
        inner.seen.clear();
        let _ = self.changes.send(ListChange::Cleared);
    }

    /// Returns true if `item` is present.
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        self.inner.read().seen.contains(item)
    }

    /// Returns a copy of the current items in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.read().items.clone()
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Subscribes to future changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ListChange> {
        self.changes.subscribe()
    }
}
