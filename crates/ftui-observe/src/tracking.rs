#![forbid(unsafe_code)]

//! Explicit dependency recording for computed getters.
//!
//! A getter receives a [`DependencyRecorder`]. Every read made through the
//! recorder is logged as a [`Dependency`]; reads made directly on the target
//! are not. After evaluation the computed observer subscribes to exactly the
//! recorded set.
//!
//! # Preconditions
//!
//! Getters must be side-effect free with respect to observed state. The
//! recorder does not detect writes made during evaluation.

use std::cell::RefCell;

use crate::collections::Collection;
use crate::value::{Object, PropertyKey, Value, read_property};

/// Something a getter read during evaluation.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// A property of an object, or a derived property (`length`, `size`,
    /// an index) of a collection.
    Property { target: Value, key: PropertyKey },
    /// The structure of a whole collection.
    Collection(Collection),
}

/// Recording context handed to accessor getters.
#[derive(Debug, Default)]
pub struct DependencyRecorder {
    log: Option<RefCell<Vec<Dependency>>>,
}

impl DependencyRecorder {
    /// A recorder that records nothing (plain reads).
    #[must_use]
    pub fn untracked() -> Self {
        Self { log: None }
    }

    #[must_use]
    pub(crate) fn recording() -> Self {
        Self {
            log: Some(RefCell::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.log.is_some()
    }

    /// Read `key` from `target`, recording the read.
    pub fn get(&self, target: &Object, key: impl Into<PropertyKey>) -> Value {
        let key = key.into();
        let value = target.get(&key);
        self.record(Dependency::Property {
            target: Value::Object(target.clone()),
            key,
        });
        value
    }

    /// Read `key` from any value, recording the read when the target is a
    /// reference. Primitive reads are never dependencies.
    pub fn read(&self, target: &Value, key: impl Into<PropertyKey>) -> Value {
        let key = key.into();
        let value = read_property(target, &key);
        if target.target_id().is_some() {
            self.record(Dependency::Property {
                target: target.clone(),
                key,
            });
        }
        value
    }

    /// Record a dependency on the structure of `collection` (iteration,
    /// membership tests, anything beyond a single derived property).
    pub fn observe_collection(&self, collection: impl Into<Collection>) {
        self.record(Dependency::Collection(collection.into()));
    }

    fn record(&self, dependency: Dependency) {
        if let Some(log) = &self.log {
            log.borrow_mut().push(dependency);
        }
    }

    pub(crate) fn into_dependencies(self) -> Vec<Dependency> {
        self.log.map(RefCell::into_inner).unwrap_or_default()
    }
}
