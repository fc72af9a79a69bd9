#![forbid(unsafe_code)]

//! Observers for accessor properties.
//!
//! [`ComputedObserver`] evaluates the getter with a recording
//! [`DependencyRecorder`], subscribes to every recorded dependency, and
//! re-evaluates when any of them changes. Dependencies are versioned: each
//! evaluation bumps the version, re-stamps the dependencies it read, and
//! drops the ones it did not.
//!
//! [`CachedAccessorObserver`] serves accessors declared pure. It tracks no
//! dependencies: the cached value refreshes only when written through the
//! observer.
//!
//! # Invariants
//!
//! 1. A computed observer with no subscribers holds no dependency
//!    subscriptions.
//! 2. Re-entrant evaluation (a dependency changing while the getter or the
//!    setter runs) is ignored; the outer evaluation wins.
//! 3. Subscribers see `(new, old)` only when the re-evaluated value differs
//!    from the cached one.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use crate::error::{ObserveError, Result};
use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::locator::ObserverLocator;
use crate::observer::{ObserverKind, PropertyObserver};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::tracking::{Dependency, DependencyRecorder};
use crate::value::{Getter, Object, PropertyKey, Setter, TargetKind, Value, WeakObject};

// ---------------------------------------------------------------------------
// Observation record
// ---------------------------------------------------------------------------

/// Versioned set of sources a computed observer is subscribed to.
#[derive(Default)]
struct ObservationRecord {
    version: Cell<u64>,
    sources: RefCell<Vec<(Rc<dyn Subscribable>, u64)>>,
}

impl ObservationRecord {
    fn begin(&self) -> u64 {
        let next = self.version.get().wrapping_add(1);
        self.version.set(next);
        next
    }

    fn add(&self, source: Rc<dyn Subscribable>, subscriber: &Rc<dyn Subscriber>, version: u64) {
        {
            let mut sources = self.sources.borrow_mut();
            if let Some(entry) = sources
                .iter_mut()
                .find(|(s, _)| std::ptr::addr_eq(Rc::as_ptr(s), Rc::as_ptr(&source)))
            {
                entry.1 = version;
                return;
            }
            sources.push((Rc::clone(&source), version));
        }
        source.subscribe(Rc::clone(subscriber));
    }

    /// Unsubscribe from every source not stamped with `version`.
    fn clear_stale(&self, subscriber: &Rc<dyn Subscriber>, version: u64) {
        let stale: Vec<Rc<dyn Subscribable>> = {
            let mut sources = self.sources.borrow_mut();
            let mut stale = Vec::new();
            sources.retain(|(source, stamp)| {
                if *stamp == version {
                    true
                } else {
                    stale.push(Rc::clone(source));
                    false
                }
            });
            stale
        };
        for source in stale {
            source.unsubscribe(subscriber);
        }
    }

    fn clear_all(&self, subscriber: &Rc<dyn Subscriber>) {
        let all = std::mem::take(&mut *self.sources.borrow_mut());
        for (source, _) in all {
            source.unsubscribe(subscriber);
        }
    }

    fn len(&self) -> usize {
        self.sources.borrow().len()
    }
}

// ---------------------------------------------------------------------------
// ComputedObserver
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ComputedState {
    value: Value,
    dirty: bool,
    running: bool,
}

pub struct ComputedObserver {
    target: WeakObject,
    key: PropertyKey,
    get: Getter,
    set: Option<Setter>,
    locator: Weak<ObserverLocator>,
    state: RefCell<ComputedState>,
    dependencies: ObservationRecord,
    subscribers: SubscriberRecord,
    this: Weak<ComputedObserver>,
}

impl ComputedObserver {
    pub(crate) fn new(
        target: &Object,
        key: PropertyKey,
        get: Getter,
        set: Option<Setter>,
        locator: Weak<ObserverLocator>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            target: target.downgrade(),
            key,
            get,
            set,
            locator,
            state: RefCell::new(ComputedState {
                dirty: true,
                ..ComputedState::default()
            }),
            dependencies: ObservationRecord::default(),
            subscribers: SubscriberRecord::new(),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Number of sources currently subscribed to.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Evaluate the getter with dependency tracking and cache the result.
    ///
    /// # Errors
    ///
    /// [`ObserveError::MissingAmbientContext`] when the target object or the
    /// locator that created this observer has been dropped.
    pub fn evaluate(&self) -> Result<Value> {
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("computed evaluation", "target object"))?;
        let locator = self
            .locator
            .upgrade()
            .ok_or_else(|| ObserveError::missing("computed evaluation", "observer locator"))?;
        let this: Rc<dyn Subscriber> = self
            .this
            .upgrade()
            .ok_or_else(|| ObserveError::missing("computed evaluation", "observer"))?;

        self.state.borrow_mut().running = true;
        let recorder = DependencyRecorder::recording();
        let value = (self.get)(&target, &recorder);

        let version = self.dependencies.begin();
        for dependency in recorder.into_dependencies() {
            let source: Rc<dyn Subscribable> = match dependency {
                Dependency::Property { target, key } => match locator.get_observer(&target, &key) {
                    Ok(observer) => observer,
                    Err(err) => {
                        debug!(key = %key, %err, "skipping unobservable dependency");
                        continue;
                    }
                },
                Dependency::Collection(collection) => locator.get_collection_observer(&collection),
            };
            self.dependencies.add(source, &this, version);
        }
        self.dependencies.clear_stale(&this, version);

        let mut state = self.state.borrow_mut();
        state.running = false;
        state.dirty = false;
        state.value = value.clone();
        trace!(key = %self.key, deps = self.dependencies.len(), "computed evaluated");
        Ok(value)
    }

    /// Re-evaluate and notify if the value changed.
    fn run(&self, flags: ChangeFlags) {
        let old = {
            let state = self.state.borrow();
            if state.running {
                return;
            }
            state.value.clone()
        };
        match self.evaluate() {
            Ok(new) => {
                if new != old {
                    self.subscribers.notify(&new, &old, flags);
                }
            }
            Err(err) => {
                self.state.borrow_mut().running = false;
                error!(key = %self.key, %err, "computed re-evaluation failed");
            }
        }
    }

    fn invalidate(&self, flags: ChangeFlags) {
        self.state.borrow_mut().dirty = true;
        if self.subscribers.any() {
            self.run(flags);
        }
    }

    fn read_untracked(&self) -> Value {
        self.target
            .upgrade()
            .map(|target| (self.get)(&target, &DependencyRecorder::untracked()))
            .unwrap_or_default()
    }
}

impl Subscriber for ComputedObserver {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: ChangeFlags) {
        self.invalidate(flags);
    }

    fn handle_collection_change(&self, _index_map: &IndexMap, flags: ChangeFlags) {
        self.invalidate(flags);
    }
}

impl Subscribable for ComputedObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added
            && self.subscribers.count() == 1
            && let Err(err) = self.evaluate()
        {
            self.state.borrow_mut().running = false;
            error!(key = %self.key, %err, "computed evaluation on subscribe failed");
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && !self.subscribers.any() {
            self.state.borrow_mut().dirty = true;
            if let Some(this) = self.this.upgrade() {
                let this: Rc<dyn Subscriber> = this;
                self.dependencies.clear_all(&this);
            }
        }
        removed
    }
}

impl PropertyObserver for ComputedObserver {
    /// Cached value while subscribed (re-evaluated if stale); a fresh
    /// untracked evaluation otherwise.
    fn get_value(&self) -> Value {
        if !self.subscribers.any() {
            return self.read_untracked();
        }
        if self.is_dirty() {
            match self.evaluate() {
                Ok(value) => return value,
                Err(err) => {
                    self.state.borrow_mut().running = false;
                    error!(key = %self.key, %err, "computed evaluation failed");
                }
            }
        }
        self.state.borrow().value.clone()
    }

    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        let set = self
            .set
            .clone()
            .ok_or_else(|| ObserveError::read_only(&self.key))?;
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("computed write", "target object"))?;
        if self.subscribers.any() && !self.is_dirty() && self.state.borrow().value == value {
            return Ok(());
        }

        self.state.borrow_mut().running = true;
        set(&target, value);
        self.state.borrow_mut().running = false;

        if self.subscribers.any() {
            self.run(flags);
        } else {
            self.state.borrow_mut().dirty = true;
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Computed
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::PlainObject
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}

// ---------------------------------------------------------------------------
// CachedAccessorObserver
// ---------------------------------------------------------------------------

pub struct CachedAccessorObserver {
    target: WeakObject,
    key: PropertyKey,
    get: Getter,
    set: Option<Setter>,
    value: RefCell<Value>,
    subscribers: SubscriberRecord,
}

impl CachedAccessorObserver {
    pub(crate) fn new(target: &Object, key: PropertyKey, get: Getter, set: Option<Setter>) -> Rc<Self> {
        Rc::new(Self {
            target: target.downgrade(),
            key,
            get,
            set,
            value: RefCell::new(Value::Undefined),
            subscribers: SubscriberRecord::new(),
        })
    }

    fn read(&self) -> Value {
        self.target
            .upgrade()
            .map(|target| (self.get)(&target, &DependencyRecorder::untracked()))
            .unwrap_or_default()
    }
}

impl Subscribable for CachedAccessorObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added && self.subscribers.count() == 1 {
            *self.value.borrow_mut() = self.read();
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }
}

impl PropertyObserver for CachedAccessorObserver {
    fn get_value(&self) -> Value {
        if self.subscribers.any() {
            self.value.borrow().clone()
        } else {
            self.read()
        }
    }

    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        let set = self
            .set
            .clone()
            .ok_or_else(|| ObserveError::read_only(&self.key))?;
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("accessor write", "target object"))?;
        set(&target, value);
        let new = self.read();
        let old = std::mem::replace(&mut *self.value.borrow_mut(), new.clone());
        if self.subscribers.any() && new != old {
            self.subscribers.notify(&new, &old, flags);
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::CachedAccessor
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::PlainObject
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObserverConfig;
    use crate::subscriber::from_fn;
    use crate::value::Accessor;

    fn counter() -> (Rc<Cell<u32>>, Rc<dyn Subscriber>) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, from_fn(move |_, _, _| c.set(c.get() + 1)))
    }

    fn switching_object() -> Object {
        let obj = Object::from_pairs([("a", Value::from(1)), ("b", Value::from(2))]);
        obj.define_data("use_a", true);
        obj.define_accessor(
            "picked",
            Accessor::getter(|o, deps| {
                if deps.get(o, "use_a").as_bool().unwrap_or(false) {
                    deps.get(o, "a")
                } else {
                    deps.get(o, "b")
                }
            }),
        );
        obj
    }

    #[test]
    fn dependencies_follow_the_last_evaluation() {
        let locator = ObserverLocator::new(ObserverConfig::default());
        let obj = switching_object();
        let observer = locator
            .get_observer(&Value::from(obj.clone()), "picked")
            .unwrap();
        assert_eq!(observer.kind(), ObserverKind::Computed);
        let (count, sub) = counter();
        observer.subscribe(sub);
        assert_eq!(observer.get_value(), Value::from(1));

        obj.set("b", 20);
        assert_eq!(count.get(), 0);
        obj.set("a", 10);
        assert_eq!(count.get(), 1);

        obj.set("use_a", false);
        assert_eq!(count.get(), 2);
        assert_eq!(observer.get_value(), Value::from(20));

        obj.set("a", 11);
        assert_eq!(count.get(), 2);
        obj.set("b", 21);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn last_unsubscribe_drops_dependencies() {
        let locator = ObserverLocator::new(ObserverConfig::default());
        let obj = switching_object();
        let target = Value::from(obj.clone());
        let observer = locator.get_observer(&target, "picked").unwrap();
        let (_, sub) = counter();
        observer.subscribe(Rc::clone(&sub));

        let a = locator.get_observer(&target, "a").unwrap();
        assert_eq!(a.subscriber_count(), 1);
        observer.unsubscribe(&sub);
        assert_eq!(a.subscriber_count(), 0);

        obj.set("a", 5);
        assert_eq!(observer.get_value(), Value::from(5));
    }

    #[test]
    fn evaluation_without_locator_is_an_error() {
        let locator = ObserverLocator::new(ObserverConfig::default());
        let obj = switching_object();
        let observer = ComputedObserver::new(
            &obj,
            "picked".into(),
            Rc::new(|o: &Object, deps: &DependencyRecorder| deps.get(o, "a")),
            None,
            Rc::downgrade(&locator),
        );
        drop(locator);
        assert!(matches!(
            observer.evaluate(),
            Err(ObserveError::MissingAmbientContext { .. })
        ));
        assert!(matches!(
            observer.set_value(Value::from(1), ChangeFlags::empty()),
            Err(ObserveError::ReadOnlyProperty { .. })
        ));
    }

    #[test]
    fn setter_writes_back_and_notifies_once() {
        let locator = ObserverLocator::new(ObserverConfig::default());
        let obj = Object::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
        obj.define_accessor(
            "full",
            Accessor::getter(|o, deps| {
                let first = deps.get(o, "first");
                let last = deps.get(o, "last");
                Value::from(format!(
                    "{} {}",
                    first.as_str().unwrap_or_default(),
                    last.as_str().unwrap_or_default()
                ))
            })
            .with_setter(|o, v| {
                let text = v.as_str().unwrap_or_default().to_owned();
                let (first, last) = text.split_once(' ').unwrap_or((text.as_str(), ""));
                o.set("first", first);
                o.set("last", last);
            }),
        );
        let observer = locator
            .get_observer(&Value::from(obj.clone()), "full")
            .unwrap();
        let (count, sub) = counter();
        observer.subscribe(sub);

        observer
            .set_value(Value::from("Grace Hopper"), ChangeFlags::empty())
            .unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(obj.get("first"), Value::from("Grace"));
        assert_eq!(observer.get_value(), Value::from("Grace Hopper"));
    }

    #[test]
    fn pure_accessor_refreshes_only_through_the_observer() {
        let locator = ObserverLocator::new(ObserverConfig::default());
        let obj = Object::from_pairs([("raw", 1)]);
        obj.define_accessor(
            "doubled",
            Accessor::getter(|o, _| Value::from(o.get("raw").as_number().unwrap_or(0.0) * 2.0))
                .with_setter(|o, v| o.set("raw", v.as_number().unwrap_or(0.0) / 2.0))
                .pure(),
        );
        let observer = locator
            .get_observer(&Value::from(obj.clone()), "doubled")
            .unwrap();
        assert_eq!(observer.kind(), ObserverKind::CachedAccessor);
        let (count, sub) = counter();
        observer.subscribe(sub);

        obj.set("raw", 5);
        assert_eq!(count.get(), 0);
        assert_eq!(observer.get_value(), Value::from(2));

        observer.set_value(Value::from(8), ChangeFlags::empty()).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(observer.get_value(), Value::from(8));
    }
}
