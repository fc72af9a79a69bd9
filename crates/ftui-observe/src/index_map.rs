#![forbid(unsafe_code)]

//! Structural diff for ordered collections.
//!
//! An [`IndexMap`] describes how a collection got from its state at the last
//! notification to its current state. It has one entry per **current**
//! position:
//!
//! - [`IndexEntry::Prior(i)`](IndexEntry::Prior): the element now at this
//!   position was at index `i` before.
//! - [`IndexEntry::Created`]: the element here is new (inserted, or its
//!   content was replaced in place).
//!
//! Prior indices of elements that no longer exist are listed in
//! [`deleted_indices`](IndexMap::deleted_indices), with the removed values
//! alongside in [`deleted_items`](IndexMap::deleted_items). For mappings the
//! removed item is the entry's key.
//!
//! # Invariants
//!
//! 1. `len()` equals the collection's current size.
//! 2. Every surviving prior index appears exactly once as a `Prior` entry.
//! 3. Every removed prior index appears exactly once in `deleted_indices`.
//! 4. `deleted_indices` and `deleted_items` have equal length.
//!
//! # Example
//!
//! ```
//! use ftui_observe::index_map::{IndexEntry, IndexMap};
//!
//! let map = IndexMap::identity(3);
//! assert!(map.is_identity());
//! assert_eq!(map.entries(), &[IndexEntry::Prior(0), IndexEntry::Prior(1), IndexEntry::Prior(2)]);
//! ```

use crate::value::Value;

/// Origin of the element at one current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexEntry {
    /// The element was at this prior index.
    Prior(usize),
    /// The element is new at this position.
    Created,
}

impl IndexEntry {
    /// Prior index, if the element survived.
    #[must_use]
    pub const fn prior(self) -> Option<usize> {
        match self {
            Self::Prior(index) => Some(index),
            Self::Created => None,
        }
    }
}

/// Position diff for one collection since its last notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMap {
    entries: Vec<IndexEntry>,
    deleted_indices: Vec<usize>,
    deleted_items: Vec<Value>,
}

impl IndexMap {
    /// Map for a collection of `len` elements that has not changed.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len).map(IndexEntry::Prior).collect(),
            deleted_indices: Vec::new(),
            deleted_items: Vec::new(),
        }
    }

    /// Build a map from raw parts.
    ///
    /// Used by consumers that diff collections themselves before handing the
    /// result to the reconciler.
    #[must_use]
    pub fn from_parts(entries: Vec<IndexEntry>, deleted_indices: Vec<usize>) -> Self {
        let deleted_items = vec![Value::Undefined; deleted_indices.len()];
        Self {
            entries,
            deleted_indices,
            deleted_items,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<IndexEntry> {
        self.entries.get(position).copied()
    }

    /// Prior indices of removed elements, in removal order.
    #[must_use]
    pub fn deleted_indices(&self) -> &[usize] {
        &self.deleted_indices
    }

    /// Removed values, parallel to [`deleted_indices`](Self::deleted_indices).
    #[must_use]
    pub fn deleted_items(&self) -> &[Value] {
        &self.deleted_items
    }

    /// True when every position still holds the element it held before and
    /// nothing was removed.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.deleted_indices.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(position, entry)| *entry == IndexEntry::Prior(position))
    }

    /// Number of elements present before the recorded changes.
    #[must_use]
    pub fn prior_len(&self) -> usize {
        self.entries.iter().filter(|e| e.prior().is_some()).count() + self.deleted_indices.len()
    }

    /// Replay this diff onto a shadow copy of the prior collection.
    ///
    /// Surviving elements are cloned from `prior`; created positions, and
    /// prior indices `prior` does not have, are filled by `create(position)`.
    pub fn apply<T: Clone>(&self, prior: &[T], mut create: impl FnMut(usize) -> T) -> Vec<T> {
        self.entries
            .iter()
            .enumerate()
            .map(|(position, entry)| match entry {
                IndexEntry::Prior(index) => prior
                    .get(*index)
                    .cloned()
                    .unwrap_or_else(|| create(position)),
                IndexEntry::Created => create(position),
            })
            .collect()
    }

    // ── Bookkeeping (driven by instrumented collection operations) ──────

    pub(crate) fn push_created(&mut self, count: usize) {
        self.entries
            .extend(std::iter::repeat_n(IndexEntry::Created, count));
    }

    pub(crate) fn insert_created(&mut self, at: usize, count: usize) {
        self.entries
            .splice(at..at, std::iter::repeat_n(IndexEntry::Created, count));
    }

    /// Drop the slot at `at`, remembering its prior index if it had one.
    pub(crate) fn remove_at(&mut self, at: usize, item: Value) {
        let entry = self.entries.remove(at);
        self.forget(entry, item);
    }

    /// Drop `items.len()` slots starting at `start`.
    pub(crate) fn remove_range(&mut self, start: usize, items: Vec<Value>) {
        let end = start + items.len();
        let removed: Vec<IndexEntry> = self.entries.drain(start..end).collect();
        for (entry, item) in removed.into_iter().zip(items) {
            self.forget(entry, item);
        }
    }

    /// The content at `at` was replaced in place.
    pub(crate) fn mark_replaced(&mut self, at: usize, item: Value) {
        let entry = std::mem::replace(&mut self.entries[at], IndexEntry::Created);
        self.forget(entry, item);
    }

    pub(crate) fn clear_all(&mut self, items: Vec<Value>) {
        let removed = std::mem::take(&mut self.entries);
        for (entry, item) in removed.into_iter().zip(items) {
            self.forget(entry, item);
        }
    }

    pub(crate) fn reverse(&mut self) {
        self.entries.reverse();
    }

    /// Reorder entries so that new position `i` takes old position `order[i]`.
    pub(crate) fn permute(&mut self, order: &[usize]) {
        let old = std::mem::take(&mut self.entries);
        self.entries = order.iter().map(|&from| old[from]).collect();
    }

    /// Grow with `Created` slots or shrink to `len` (shrinking only happens
    /// when a collection is resized without per-item bookkeeping).
    pub(crate) fn resize(&mut self, len: usize) {
        if len >= self.entries.len() {
            self.push_created(len - self.entries.len());
        } else {
            let tail: Vec<IndexEntry> = self.entries.drain(len..).collect();
            for entry in tail {
                self.forget(entry, Value::Undefined);
            }
        }
    }

    fn forget(&mut self, entry: IndexEntry, item: Value) {
        if let IndexEntry::Prior(index) = entry {
            self.deleted_indices.push(index);
            self.deleted_items.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IndexEntry::{Created, Prior};

    #[test]
    fn identity_is_identity() {
        let map = IndexMap::identity(4);
        assert_eq!(map.len(), 4);
        assert!(map.is_identity());
        assert_eq!(map.prior_len(), 4);
        assert!(IndexMap::identity(0).is_identity());
    }

    #[test]
    fn remove_then_push() {
        let mut map = IndexMap::identity(3);
        map.remove_at(1, Value::from("b"));
        map.push_created(1);
        assert_eq!(map.entries(), &[Prior(0), Prior(2), Created]);
        assert_eq!(map.deleted_indices(), &[1]);
        assert_eq!(map.deleted_items(), &[Value::from("b")]);
        assert!(!map.is_identity());
    }

    #[test]
    fn removing_created_slot_leaves_no_trace() {
        let mut map = IndexMap::identity(1);
        map.push_created(1);
        map.remove_at(1, Value::from(9));
        assert!(map.deleted_indices().is_empty());
        assert!(map.is_identity());
    }

    #[test]
    fn replace_in_place() {
        let mut map = IndexMap::identity(2);
        map.mark_replaced(0, Value::from(1));
        assert_eq!(map.entries(), &[Created, Prior(1)]);
        assert_eq!(map.deleted_indices(), &[0]);
    }

    #[test]
    fn clear_moves_everything_to_deleted() {
        let mut map = IndexMap::identity(3);
        map.clear_all(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert!(map.is_empty());
        assert_eq!(map.deleted_indices(), &[0, 1, 2]);
        assert_eq!(map.prior_len(), 3);
    }

    #[test]
    fn permute_and_reverse() {
        let mut map = IndexMap::identity(3);
        map.reverse();
        assert_eq!(map.entries(), &[Prior(2), Prior(1), Prior(0)]);
        map.permute(&[1, 2, 0]);
        assert_eq!(map.entries(), &[Prior(1), Prior(0), Prior(2)]);
    }

    #[test]
    fn apply_fills_missing_prior_entries() {
        let map = IndexMap::from_parts(
            vec![Prior(1), Prior(7), Created],
            vec![0],
        );
        let shadow = map.apply(&["a", "b"], |position| if position == 1 { "gap" } else { "new" });
        assert_eq!(shadow, vec!["b", "gap", "new"]);
    }

    #[test]
    fn apply_replays_onto_shadow() {
        let mut map = IndexMap::identity(3);
        map.remove_range(0, vec![Value::from("a")]);
        map.insert_created(1, 2);
        let shadow = map.apply(&["a", "b", "c"], |_| "new");
        assert_eq!(shadow, vec!["b", "new", "new", "c"]);
    }

    #[test]
    fn resize_shrinks_and_grows() {
        let mut map = IndexMap::identity(4);
        map.resize(2);
        assert_eq!(map.entries(), &[Prior(0), Prior(1)]);
        assert_eq!(map.deleted_indices(), &[2, 3]);
        map.resize(3);
        assert_eq!(map.entries(), &[Prior(0), Prior(1), Created]);
    }
}
