#![forbid(unsafe_code)]

//! Ordered, index-addressed collection.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::instrument;
use crate::value::{TargetId, Value};

/// Shared handle to an ordered list of values.
///
/// Cloning the handle shares the list. Mutating operations keep their
/// native return values and additionally report to the collection observer
/// when instrumentation is active.
#[derive(Clone, Default)]
pub struct Sequence {
    inner: Rc<RefCell<Vec<Value>>>,
}

/// Non-owning handle to a [`Sequence`].
#[derive(Clone, Debug)]
pub struct WeakSequence {
    inner: Weak<RefCell<Vec<Value>>>,
}

impl WeakSequence {
    #[must_use]
    pub fn upgrade(&self) -> Option<Sequence> {
        self.inner.upgrade().map(|inner| Sequence { inner })
    }
}

impl Sequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(values.into_iter().collect())),
        }
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        TargetId::of(&self.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSequence {
        WeakSequence {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Element at `index`, `Undefined` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.inner.borrow().get(index).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().clone()
    }

    #[must_use]
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.inner.borrow().iter().position(|v| v == value)
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// Record a structural change with the collection observer, if any.
    fn report(&self, record: impl FnOnce(&mut IndexMap)) {
        self.report_with(ChangeFlags::empty(), record);
    }

    fn report_with(&self, flags: ChangeFlags, record: impl FnOnce(&mut IndexMap)) {
        if let Some(observer) = instrument::tap(self.id()) {
            observer.record(flags, record);
            observer.notify();
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Append one value. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let len = {
            let mut items = self.inner.borrow_mut();
            items.push(value.into());
            items.len()
        };
        self.report(|map| map.push_created(1));
        len
    }

    /// Append several values. Returns the new length.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        self.extend_with_flags(values, ChangeFlags::empty())
    }

    fn extend_with_flags(&self, values: impl IntoIterator<Item = Value>, flags: ChangeFlags) -> usize {
        let (added, len) = {
            let mut items = self.inner.borrow_mut();
            let before = items.len();
            items.extend(values);
            (items.len() - before, items.len())
        };
        if added > 0 {
            self.report_with(flags, |map| map.push_created(added));
        }
        len
    }

    /// Remove and return the last value.
    pub fn pop(&self) -> Option<Value> {
        let (removed, at) = {
            let mut items = self.inner.borrow_mut();
            let removed = items.pop()?;
            (removed, items.len())
        };
        let item = removed.clone();
        self.report(|map| map.remove_at(at, item));
        Some(removed)
    }

    /// Remove and return the first value.
    pub fn shift(&self) -> Option<Value> {
        self.remove(0)
    }

    /// Prepend values, keeping their order. Returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let (added, len) = {
            let mut items = self.inner.borrow_mut();
            let before = items.len();
            let incoming: Vec<Value> = values.into_iter().collect();
            let added = incoming.len();
            items.splice(0..0, incoming);
            debug_assert_eq!(items.len(), before + added);
            (added, items.len())
        };
        if added > 0 {
            self.report(|map| map.insert_created(0, added));
        }
        len
    }

    /// Remove `delete_count` values at `start` and insert `items` there.
    ///
    /// A negative `start` counts from the end; `start` is clamped to the
    /// length. `None` deletes through the end. Returns the removed values.
    pub fn splice(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        self.splice_with_flags(start, delete_count, items, ChangeFlags::empty())
    }

    fn splice_with_flags(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = Value>,
        flags: ChangeFlags,
    ) -> Vec<Value> {
        let incoming: Vec<Value> = items.into_iter().collect();
        let added = incoming.len();
        let (start, removed) = {
            let mut values = self.inner.borrow_mut();
            let len = values.len();
            let start = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                start.unsigned_abs().min(len)
            };
            let available = len - start;
            let delete = delete_count.map_or(available, |d| d.min(available));
            let removed: Vec<Value> = values.splice(start..start + delete, incoming).collect();
            (start, removed)
        };
        if !removed.is_empty() || added > 0 {
            let deleted = removed.clone();
            self.report_with(flags, |map| {
                map.remove_range(start, deleted);
                map.insert_created(start, added);
            });
        }
        removed
    }

    /// Insert `value` at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let at = {
            let mut items = self.inner.borrow_mut();
            let at = index.min(items.len());
            items.insert(at, value.into());
            at
        };
        self.report(|map| map.insert_created(at, 1));
    }

    /// Remove and return the value at `index`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.inner.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        let item = removed.clone();
        self.report(|map| map.remove_at(index, item));
        Some(removed)
    }

    /// Remove the first occurrence of `value`.
    pub fn remove_value(&self, value: &Value) -> bool {
        match self.index_of(value) {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }

    /// Assign `value` at `index`, growing with `Undefined` holes when
    /// `index` is past the end. Assigning an equal value is a no-op.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        self.set_with_flags(index, value, ChangeFlags::empty());
    }

    /// [`set`](Self::set), reporting `flags` with the change.
    pub(crate) fn set_with_flags(&self, index: usize, value: impl Into<Value>, flags: ChangeFlags) {
        let value = value.into();
        enum Change {
            None,
            Replaced(Value),
            Grown(usize),
        }
        let change = {
            let mut items = self.inner.borrow_mut();
            if let Some(slot) = items.get_mut(index) {
                if *slot == value {
                    Change::None
                } else {
                    Change::Replaced(std::mem::replace(slot, value))
                }
            } else {
                items.resize(index, Value::Undefined);
                items.push(value);
                Change::Grown(items.len())
            }
        };
        match change {
            Change::None => {}
            Change::Replaced(old) => self.report_with(flags, |map| map.mark_replaced(index, old)),
            Change::Grown(len) => self.report_with(flags, |map| map.resize(len)),
        }
    }

    /// Truncate or pad with `Undefined` to exactly `len` elements.
    pub fn set_len(&self, len: usize) {
        self.set_len_with_flags(len, ChangeFlags::empty());
    }

    /// [`set_len`](Self::set_len), reporting `flags` with the change.
    pub(crate) fn set_len_with_flags(&self, len: usize, flags: ChangeFlags) {
        let current = self.len();
        if len < current {
            let start = len.min(isize::MAX as usize) as isize;
            let _ = self.splice_with_flags(start, None, [], flags);
        } else if len > current {
            let padding = std::iter::repeat_n(Value::Undefined, len - current);
            let _ = self.extend_with_flags(padding, flags);
        }
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        let len = {
            let mut items = self.inner.borrow_mut();
            items.reverse();
            items.len()
        };
        if len > 1 {
            self.report(IndexMap::reverse);
        }
    }

    /// Stable sort by `compare`.
    ///
    /// `compare` runs on a snapshot, so it may read the sequence.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let snapshot = self.to_vec();
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.sort_by(|&a, &b| compare(&snapshot[a], &snapshot[b]));
        if order.iter().enumerate().all(|(i, &from)| i == from) {
            return;
        }
        let sorted: Vec<Value> = order.iter().map(|&from| snapshot[from].clone()).collect();
        *self.inner.borrow_mut() = sorted;
        self.report(|map| map.permute(&order));
    }

    /// Remove every value.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.borrow_mut());
        if !removed.is_empty() {
            self.report(|map| map.clear_all(removed));
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[i32]) -> Sequence {
        Sequence::from_values(values.iter().copied().map(Value::from))
    }

    fn as_nums(seq: &Sequence) -> Vec<f64> {
        seq.to_vec().iter().filter_map(Value::as_number).collect()
    }

    #[test]
    fn native_return_values() {
        let seq = nums(&[1, 2, 3]);
        assert_eq!(seq.push(4), 4);
        assert_eq!(seq.pop(), Some(Value::from(4)));
        assert_eq!(seq.shift(), Some(Value::from(1)));
        assert_eq!(seq.unshift([Value::from(0), Value::from(1)]), 4);
        assert_eq!(as_nums(&seq), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(Sequence::new().pop(), None);
    }

    #[test]
    fn splice_follows_negative_start_and_clamping() {
        let seq = nums(&[1, 2, 3, 4, 5]);
        let removed = seq.splice(-2, Some(1), [Value::from(9)]);
        assert_eq!(removed, vec![Value::from(4)]);
        assert_eq!(as_nums(&seq), vec![1.0, 2.0, 3.0, 9.0, 5.0]);

        let removed = seq.splice(10, Some(3), [Value::from(7)]);
        assert!(removed.is_empty());
        assert_eq!(seq.len(), 6);

        let removed = seq.splice(1, None, []);
        assert_eq!(removed.len(), 5);
        assert_eq!(as_nums(&seq), vec![1.0]);
    }

    #[test]
    fn set_past_end_pads_with_undefined() {
        let seq = nums(&[1]);
        seq.set(3, 4);
        assert_eq!(seq.len(), 4);
        assert!(seq.get(1).is_undefined());
        assert_eq!(seq.get(3), Value::from(4));
    }

    #[test]
    fn set_len_truncates_and_pads() {
        let seq = nums(&[1, 2, 3]);
        seq.set_len(1);
        assert_eq!(as_nums(&seq), vec![1.0]);
        seq.set_len(3);
        assert_eq!(seq.len(), 3);
        assert!(seq.get(2).is_undefined());
    }

    #[test]
    fn sort_by_is_stable() {
        let seq = Sequence::from_values([
            Value::from("b1"),
            Value::from("a"),
            Value::from("b2"),
        ]);
        seq.sort_by(|a, b| {
            let first = |v: &Value| v.as_str().and_then(|s| s.chars().next());
            first(a).cmp(&first(b))
        });
        assert_eq!(
            seq.to_vec(),
            vec![Value::from("a"), Value::from("b1"), Value::from("b2")]
        );
    }

    #[test]
    fn remove_value_and_insert() {
        let seq = nums(&[1, 2, 3]);
        assert!(seq.remove_value(&Value::from(2)));
        assert!(!seq.remove_value(&Value::from(42)));
        seq.insert(100, 9);
        assert_eq!(as_nums(&seq), vec![1.0, 3.0, 9.0]);
        assert_eq!(seq.remove(10), None);
    }

    #[test]
    fn weak_handle_tracks_liveness() {
        let seq = nums(&[1]);
        let weak = seq.downgrade();
        assert!(weak.upgrade().is_some());
        drop(seq);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn sort_comparator_may_read_the_sequence() {
        let items = nums(&[3, 1, 2]);
        let reader = items.clone();
        items.sort_by(|a, b| {
            assert_eq!(reader.len(), 3);
            assert!(reader.contains(a));
            a.as_number()
                .partial_cmp(&b.as_number())
                .unwrap_or(Ordering::Equal)
        });
        assert_eq!(items.to_vec(), nums(&[1, 2, 3]).to_vec());
    }
}
