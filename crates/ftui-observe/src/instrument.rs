#![forbid(unsafe_code)]

//! Collection instrumentation.
//!
//! Mutating operations on [`Sequence`](crate::Sequence),
//! [`Mapping`](crate::Mapping) and [`ValueSet`](crate::ValueSet) consult a
//! thread-local registry keyed by collection identity. When instrumentation
//! is installed and the instance has a collection observer, the operation
//! records its delta there and notifies; otherwise it behaves natively.
//!
//! Installation is process-wide (per thread) and idempotent. It happens
//! lazily the first time a collection observer is requested. Uninstalling
//! restores plain behavior for every instance while keeping registered
//! observers; reinstalling resumes reporting with each observer's index map
//! reset to identity, since changes made while uninstalled were not
//! recorded.
//!
//! # Lifetime
//!
//! The registry holds observers strongly and collections weakly. Entries
//! for dropped collections are pruned as the registry grows; an identity
//! reused by a new collection replaces the stale entry.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

use crate::collections::{Collection, WeakCollection};
use crate::observer::collection::CollectionObserver;
use crate::value::TargetId;

const MIN_PRUNE_THRESHOLD: usize = 64;

struct Registered {
    collection: WeakCollection,
    observer: Rc<CollectionObserver>,
}

impl Registered {
    fn is_alive(&self) -> bool {
        self.collection.upgrade().is_some()
    }
}

struct Registry {
    installed: bool,
    observers: AHashMap<TargetId, Registered>,
    prune_at: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            installed: false,
            observers: AHashMap::new(),
            prune_at: MIN_PRUNE_THRESHOLD,
        }
    }
}

impl Registry {
    fn prune(&mut self) {
        let before = self.observers.len();
        self.observers.retain(|_, entry| entry.is_alive());
        self.prune_at = (self.observers.len() * 2).max(MIN_PRUNE_THRESHOLD);
        debug!(
            pruned = before - self.observers.len(),
            live = self.observers.len(),
            "pruned collection observers"
        );
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Activate interception. Idempotent.
pub fn install() {
    let observers: Vec<Rc<CollectionObserver>> = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        if registry.installed {
            return Vec::new();
        }
        registry.installed = true;
        registry
            .observers
            .values()
            .filter(|entry| entry.is_alive())
            .map(|entry| Rc::clone(&entry.observer))
            .collect()
    });
    if !observers.is_empty() {
        debug!(count = observers.len(), "reinstalled collection instrumentation");
    }
    for observer in observers {
        observer.reset_index_map();
    }
}

/// Restore native collection behavior. Registered observers are kept.
pub fn uninstall() {
    let was_installed =
        REGISTRY.with(|r| std::mem::replace(&mut r.borrow_mut().installed, false));
    if was_installed {
        debug!("uninstalled collection instrumentation");
    }
}

#[must_use]
pub fn is_installed() -> bool {
    REGISTRY.with(|r| r.borrow().installed)
}

/// Uninstall and forget every registered observer.
pub fn reset() {
    let dropped = REGISTRY.with(|r| std::mem::take(&mut *r.borrow_mut()));
    drop(dropped);
}

/// Number of registered collection observers (including stale ones not yet
/// pruned).
#[must_use]
pub fn registered_count() -> usize {
    REGISTRY.with(|r| r.borrow().observers.len())
}

/// The observer to report to for collection `id`, if instrumentation is
/// installed and one exists.
pub(crate) fn tap(id: TargetId) -> Option<Rc<CollectionObserver>> {
    REGISTRY.with(|r| {
        let registry = r.borrow();
        if !registry.installed {
            return None;
        }
        registry
            .observers
            .get(&id)
            .filter(|entry| entry.is_alive())
            .map(|entry| Rc::clone(&entry.observer))
    })
}

/// The unique observer for `collection`, creating and registering it (and
/// installing instrumentation) on first request.
pub(crate) fn observer_for(collection: &Collection) -> Rc<CollectionObserver> {
    install();
    let id = collection.id();
    let existing = REGISTRY.with(|r| {
        r.borrow()
            .observers
            .get(&id)
            .filter(|entry| entry.is_alive())
            .map(|entry| Rc::clone(&entry.observer))
    });
    if let Some(observer) = existing {
        return observer;
    }

    let observer = CollectionObserver::new(collection);
    REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        registry.observers.insert(
            id,
            Registered {
                collection: collection.downgrade(),
                observer: Rc::clone(&observer),
            },
        );
        if registry.observers.len() >= registry.prune_at {
            registry.prune();
        }
    });
    debug!(kind = ?collection.kind(), len = collection.len(), "created collection observer");
    observer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::Sequence;
    use crate::value::Value;

    #[test]
    fn observer_is_unique_per_instance() {
        reset();
        let seq = Sequence::from_values([Value::from(1)]);
        let a = observer_for(&seq.clone().into());
        let b = observer_for(&seq.clone().into());
        assert!(Rc::ptr_eq(&a, &b));
        assert!(is_installed());
        assert!(tap(seq.id()).is_some());
        reset();
    }

    #[test]
    fn uninstalled_collections_are_native() {
        reset();
        let seq = Sequence::new();
        let _observer = observer_for(&seq.clone().into());
        uninstall();
        assert!(tap(seq.id()).is_none());
        install();
        assert!(tap(seq.id()).is_some());
        reset();
        assert!(!is_installed());
        assert_eq!(registered_count(), 0);
    }

    #[test]
    fn dropped_collections_are_not_tapped() {
        reset();
        let seq = Sequence::new();
        let id = seq.id();
        let _observer = observer_for(&seq.into());
        assert!(tap(id).is_none());
        reset();
    }
}
