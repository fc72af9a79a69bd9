#![forbid(unsafe_code)]

//! Unique-key mapping with insertion order.
//!
//! Positions in the [`IndexMap`] diff are insertion-order positions. A key
//! whose value changes keeps its position and is reported as replaced; the
//! deleted item recorded for it is the key.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::RandomState;
use indexmap::IndexMap as OrderedMap;

use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::instrument;
use crate::value::{TargetId, Value};

type Entries = OrderedMap<Value, Value, RandomState>;

/// Shared handle to a key/value mapping.
#[derive(Clone, Default)]
pub struct Mapping {
    inner: Rc<RefCell<Entries>>,
}

/// Non-owning handle to a [`Mapping`].
#[derive(Clone, Debug)]
pub struct WeakMapping {
    inner: Weak<RefCell<Entries>>,
}

impl WeakMapping {
    #[must_use]
    pub fn upgrade(&self) -> Option<Mapping> {
        self.inner.upgrade().map(|inner| Mapping { inner })
    }
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let entries: Entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Rc::new(RefCell::new(entries)),
        }
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        TargetId::of(&self.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMapping {
        WeakMapping {
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
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.inner.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn has(&self, key: &Value) -> bool {
        self.inner.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.inner.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.inner.borrow().values().cloned().collect()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn report(&self, record: impl FnOnce(&mut IndexMap)) {
        if let Some(observer) = instrument::tap(self.id()) {
            observer.record(ChangeFlags::empty(), record);
            observer.notify();
        }
    }

    /// Associate `key` with `value`. Returns the previous value.
    ///
    /// Re-associating an equal value changes nothing and is not reported.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        enum Change {
            None,
            Added,
            Replaced(usize),
        }
        let (previous, change) = {
            let mut entries = self.inner.borrow_mut();
            match entries.get_full_mut(&key) {
                Some((index, _, slot)) => {
                    if *slot == value {
                        (Some(slot.clone()), Change::None)
                    } else {
                        (Some(std::mem::replace(slot, value)), Change::Replaced(index))
                    }
                }
                None => {
                    entries.insert(key.clone(), value);
                    (None, Change::Added)
                }
            }
        };
        match change {
            Change::None => {}
            Change::Added => self.report(|map| map.push_created(1)),
            Change::Replaced(index) => self.report(|map| map.mark_replaced(index, key)),
        }
        previous
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &Value) -> bool {
        let removed = self.inner.borrow_mut().shift_remove_full(key);
        match removed {
            Some((index, key, _)) => {
                self.report(|map| map.remove_at(index, key));
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.borrow_mut());
        if !removed.is_empty() {
            let keys: Vec<Value> = removed.into_keys().collect();
            self.report(|map| map.clear_all(keys));
        }
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.borrow().iter()).finish()
    }
}
