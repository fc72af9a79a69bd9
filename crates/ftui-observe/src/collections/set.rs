#![forbid(unsafe_code)]

//! Unique-value set with insertion order.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::RandomState;
use indexmap::IndexSet;

use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::instrument;
use crate::value::{TargetId, Value};

type Members = IndexSet<Value, RandomState>;

/// Shared handle to a set of values.
#[derive(Clone, Default)]
pub struct ValueSet {
    inner: Rc<RefCell<Members>>,
}

/// Non-owning handle to a [`ValueSet`].
#[derive(Clone, Debug)]
pub struct WeakValueSet {
    inner: Weak<RefCell<Members>>,
}

impl WeakValueSet {
    #[must_use]
    pub fn upgrade(&self) -> Option<ValueSet> {
        self.inner.upgrade().map(|inner| ValueSet { inner })
    }
}

impl ValueSet {
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
    pub fn downgrade(&self) -> WeakValueSet {
        WeakValueSet {
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

    #[must_use]
    pub fn has(&self, value: &Value) -> bool {
        self.inner.borrow().contains(value)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().iter().cloned().collect()
    }

    fn report(&self, record: impl FnOnce(&mut IndexMap)) {
        if let Some(observer) = instrument::tap(self.id()) {
            observer.record(ChangeFlags::empty(), record);
            observer.notify();
        }
    }

    /// Add `value`. Returns `false` if it was already a member.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let added = self.inner.borrow_mut().insert(value.into());
        if added {
            self.report(|map| map.push_created(1));
        }
        added
    }

    /// Remove `value`. Returns whether it was a member.
    pub fn delete(&self, value: &Value) -> bool {
        let removed = self.inner.borrow_mut().shift_remove_full(value);
        match removed {
            Some((index, item)) => {
                self.report(|map| map.remove_at(index, item));
                true
            }
            None => false,
        }
    }

    /// Remove every member.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.borrow_mut());
        if !removed.is_empty() {
            let items: Vec<Value> = removed.into_iter().collect();
            self.report(|map| map.clear_all(items));
        }
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_delete_report_membership() {
        let s = ValueSet::new();
        assert!(s.add(1));
        assert!(!s.add(1));
        assert!(s.add("x"));
        assert!(s.has(&Value::from("x")));
        assert!(s.delete(&Value::from(1)));
        assert!(!s.delete(&Value::from(1)));
        assert_eq!(s.to_vec(), vec![Value::from("x")]);
    }

    #[test]
    fn clear_empties() {
        let s = ValueSet::from_values([Value::from(1), Value::from(2)]);
        s.clear();
        assert!(s.is_empty());
        s.clear();
        assert_eq!(s.len(), 0);
    }
}
