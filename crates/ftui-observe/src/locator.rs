#![forbid(unsafe_code)]

//! Observer lookup and caching.
//!
//! [`ObserverLocator::get_observer`] classifies `(target, key)` once and
//! returns the same observer for every later request while the target is
//! alive. Classification order:
//!
//! 1. Primitive target: a fresh [`PrimitiveObserver`], never cached.
//! 2. Host node with a registered [`NodeObserverStrategy`] that handles the
//!    key: whatever the strategy returns.
//! 3. Sequence `length` / index, mapping or set `size`: the derived
//!    observers of the collection observer.
//! 4. Bindable slot: [`BindableObserver`].
//! 5. Accessor with a getter: [`CachedAccessorObserver`] if marked pure,
//!    [`ComputedObserver`] otherwise. Setter without getter is an error.
//! 6. Slot already taken over by an observer (from any locator): that
//!    observer.
//! 7. Missing key or configurable data slot: [`SetterObserver`].
//! 8. Anything else: [`DirtyCheckProperty`], subject to the dirty-check
//!    settings.
//!
//! The cache is a side table keyed by target identity. It holds targets
//! weakly and prunes dead entries as it grows.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::debug;

use crate::collections::Collection;
use crate::config::ObserverConfig;
use crate::error::{ObserveError, Result, UnobservableReason};
use crate::instrument;
use crate::observer::{
    BindableObserver, CachedAccessorObserver, CollectionObserver, ComputedObserver, DirtyChecker,
    PrimitiveObserver, PropertyAccessor, PropertyObserver, SetterObserver,
};
use crate::value::{Object, PropertyKey, SlotShape, TargetId, Value, WeakTarget};

const MIN_PRUNE_THRESHOLD: usize = 64;

/// Observation strategy for host nodes (objects created with
/// [`Object::host`]).
pub trait NodeObserverStrategy {
    /// Whether this strategy observes `key` on `node`.
    fn handles(&self, node: &Object, key: &PropertyKey) -> bool;

    /// Build the observer for a handled key.
    fn create_observer(&self, node: &Object, key: &PropertyKey) -> Result<Rc<dyn PropertyObserver>>;
}

struct CacheEntry {
    target: WeakTarget,
    observer: Rc<dyn PropertyObserver>,
}

/// Shared observer factory and cache.
pub struct ObserverLocator {
    config: ObserverConfig,
    cache: RefCell<AHashMap<(TargetId, PropertyKey), CacheEntry>>,
    prune_at: Cell<usize>,
    dirty_checker: Rc<DirtyChecker>,
    node_strategy: Option<Rc<dyn NodeObserverStrategy>>,
    this: Weak<ObserverLocator>,
}

impl ObserverLocator {
    #[must_use]
    pub fn new(config: ObserverConfig) -> Rc<Self> {
        Self::build(config, None)
    }

    #[must_use]
    pub fn with_node_strategy(
        config: ObserverConfig,
        strategy: Rc<dyn NodeObserverStrategy>,
    ) -> Rc<Self> {
        Self::build(config, Some(strategy))
    }

    fn build(config: ObserverConfig, node_strategy: Option<Rc<dyn NodeObserverStrategy>>) -> Rc<Self> {
        let dirty_checker = DirtyChecker::new(config.dirty_check.clone());
        Rc::new_cyclic(|this| Self {
            config,
            cache: RefCell::new(AHashMap::new()),
            prune_at: Cell::new(MIN_PRUNE_THRESHOLD),
            dirty_checker,
            node_strategy,
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// The poll list for dirty-checked properties. The host scheduler
    /// drives it with [`DirtyChecker::tick`].
    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.dirty_checker
    }

    /// Number of cached observers (including entries for dead targets not
    /// yet pruned).
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Drop cache entries whose target is gone.
    pub fn prune(&self) {
        let mut cache = self.cache.borrow_mut();
        let before = cache.len();
        cache.retain(|_, entry| entry.target.is_alive());
        self.prune_at.set((cache.len() * 2).max(MIN_PRUNE_THRESHOLD));
        debug!(pruned = before - cache.len(), live = cache.len(), "pruned observer cache");
    }

    /// The observer for `key` of `target`.
    ///
    /// # Errors
    ///
    /// - [`ObserveError::UnobservableProperty`] for setter-only accessors,
    ///   and for slots that need polling while dirty checking is disabled.
    /// - [`ObserveError::DirtyCheckEngaged`] when polling is needed and the
    ///   dirty-check mode is `Throw`.
    /// - Whatever a node strategy reports.
    pub fn get_observer(
        &self,
        target: &Value,
        key: impl Into<PropertyKey>,
    ) -> Result<Rc<dyn PropertyObserver>> {
        let key = key.into();
        let (Some(id), Some(weak)) = (target.target_id(), target.downgrade()) else {
            return Ok(PrimitiveObserver::new(target.clone(), key));
        };
        if let Some(observer) = self.cached(id, &key) {
            return Ok(observer);
        }

        let observer = self.create_observer(target, &key)?;
        if observer.cacheable() {
            let mut cache = self.cache.borrow_mut();
            cache.insert(
                (id, key),
                CacheEntry {
                    target: weak,
                    observer: Rc::clone(&observer),
                },
            );
            let grown = cache.len() >= self.prune_at.get();
            drop(cache);
            if grown {
                self.prune();
            }
        }
        Ok(observer)
    }

    /// The unique observer for a collection instance, shared by every
    /// locator.
    #[must_use]
    pub fn get_collection_observer(&self, collection: &Collection) -> Rc<CollectionObserver> {
        instrument::observer_for(collection)
    }

    /// A non-observing get/set adapter for `key` of `target`.
    #[must_use]
    pub fn get_accessor(&self, target: &Value, key: impl Into<PropertyKey>) -> PropertyAccessor {
        PropertyAccessor::new(target.clone(), key.into())
    }

    fn cached(&self, id: TargetId, key: &PropertyKey) -> Option<Rc<dyn PropertyObserver>> {
        let mut cache = self.cache.borrow_mut();
        let lookup = (id, key.clone());
        let entry = cache.get(&lookup)?;
        if entry.target.is_alive() {
            return Some(Rc::clone(&entry.observer));
        }
        cache.remove(&lookup);
        None
    }

    fn create_observer(&self, target: &Value, key: &PropertyKey) -> Result<Rc<dyn PropertyObserver>> {
        let observer: Rc<dyn PropertyObserver> = match target {
            Value::Object(object) => return self.object_observer(object, key),
            Value::Sequence(sequence) => {
                let owner = self.get_collection_observer(&Collection::Sequence(sequence.clone()));
                if let Some(index) = key.as_index() {
                    owner
                        .index_observer(index)
                        .ok_or_else(|| ObserveError::missing("observe index", "sequence"))?
                } else if key.is_name("length") {
                    owner.length_observer()
                } else {
                    self.dirty_check(target, key)?
                }
            }
            Value::Mapping(_) | Value::Set(_) if key.is_name("size") => {
                let Some(collection) = target.as_collection() else {
                    return Err(ObserveError::missing("observe size", "collection"));
                };
                self.get_collection_observer(&collection).length_observer()
            }
            Value::Mapping(_) | Value::Set(_) => self.dirty_check(target, key)?,
            _ => PrimitiveObserver::new(target.clone(), key.clone()),
        };
        debug!(key = %key, kind = ?observer.kind(), target = target.type_name(), "created observer");
        Ok(observer)
    }

    fn object_observer(&self, object: &Object, key: &PropertyKey) -> Result<Rc<dyn PropertyObserver>> {
        if object.is_host()
            && let Some(strategy) = &self.node_strategy
            && strategy.handles(object, key)
        {
            debug!(key = %key, host = object.host_tag().unwrap_or_default(), "delegating to node strategy");
            return strategy.create_observer(object, key);
        }

        let observer: Rc<dyn PropertyObserver> = match object.slot_shape(key) {
            Some(SlotShape::Intercepted) => {
                let owner = object
                    .slot_owner(key)
                    .ok_or_else(|| ObserveError::missing("observe slot", "slot owner"))?;
                debug!(key = %key, kind = ?owner.kind(), "reusing slot owner");
                return Ok(owner);
            }
            None | Some(SlotShape::Data { configurable: true }) => {
                SetterObserver::new(object, key.clone())
            }
            Some(SlotShape::Bindable) => {
                let definition = object.bindable_definition(key).unwrap_or_default();
                BindableObserver::new(object, key.clone(), definition)
            }
            Some(SlotShape::Accessor { get: true, .. }) => {
                let accessor = object
                    .accessor(key)
                    .ok_or_else(|| ObserveError::missing("observe accessor", "accessor slot"))?;
                let Some(get) = accessor.get else {
                    return Err(ObserveError::missing("observe accessor", "getter"));
                };
                if accessor.pure {
                    CachedAccessorObserver::new(object, key.clone(), get, accessor.set)
                } else {
                    ComputedObserver::new(object, key.clone(), get, accessor.set, self.this.clone())
                }
            }
            Some(SlotShape::Accessor {
                get: false,
                set: true,
                ..
            }) => {
                return Err(ObserveError::unobservable(
                    key,
                    UnobservableReason::SetterWithoutGetter,
                ));
            }
            Some(SlotShape::Data {
                configurable: false,
            })
            | Some(SlotShape::Accessor {
                get: false,
                set: false,
                ..
            }) => self.dirty_check(&Value::Object(object.clone()), key)?,
        };
        debug!(key = %key, kind = ?observer.kind(), "created observer");
        Ok(observer)
    }

    fn dirty_check(&self, target: &Value, key: &PropertyKey) -> Result<Rc<dyn PropertyObserver>> {
        let property = self.dirty_checker.create_property(target, key.clone())?;
        Ok(property)
    }
}

impl fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("config", &self.config)
            .field("cached", &self.cache.borrow().len())
            .field("node_strategy", &self.node_strategy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{Mapping, Sequence};
    use crate::config::{DirtyCheckMode, DirtyCheckSettings};
    use crate::flags::ChangeFlags;
    use crate::observer::{BindableDefinition, ObserverKind};
    use crate::value::Accessor;

    fn locator() -> Rc<ObserverLocator> {
        ObserverLocator::new(ObserverConfig::default())
    }

    #[test]
    fn same_observer_for_same_target_and_key() {
        let locator = locator();
        let obj = Value::from(Object::from_pairs([("a", 1)]));
        let a = locator.get_observer(&obj, "a").unwrap();
        let b = locator.get_observer(&obj, "a").unwrap();
        assert!(std::ptr::addr_eq(Rc::as_ptr(&a), Rc::as_ptr(&b)));
        assert_eq!(locator.cached_count(), 1);
    }

    #[test]
    fn classification() {
        let locator = locator();
        let obj = Object::from_pairs([("plain", 1)]);
        obj.define_fixed("fixed", 2);
        obj.define_bindable("bound", BindableDefinition::new(), 3);
        obj.define_accessor("computed", Accessor::getter(|o, deps| deps.get(o, "plain")));
        obj.define_accessor("pure", Accessor::getter(|_, _| Value::from(1)).pure());
        let target = Value::from(obj);

        let kind = |key: &str| locator.get_observer(&target, key).unwrap().kind();
        assert_eq!(kind("plain"), ObserverKind::Setter);
        assert_eq!(kind("missing"), ObserverKind::Setter);
        assert_eq!(kind("fixed"), ObserverKind::DirtyCheck);
        assert_eq!(kind("bound"), ObserverKind::Bindable);
        assert_eq!(kind("computed"), ObserverKind::Computed);
        assert_eq!(kind("pure"), ObserverKind::CachedAccessor);

        let items = Value::from(Sequence::from_values([Value::from(1)]));
        assert_eq!(
            locator.get_observer(&items, "length").unwrap().kind(),
            ObserverKind::CollectionLength
        );
        assert_eq!(
            locator.get_observer(&items, "0").unwrap().kind(),
            ObserverKind::SequenceIndex
        );
        let map = Value::from(Mapping::new());
        assert_eq!(
            locator.get_observer(&map, "size").unwrap().kind(),
            ObserverKind::CollectionSize
        );
        assert_eq!(
            locator.get_observer(&Value::from("x"), "length").unwrap().kind(),
            ObserverKind::Primitive
        );
        instrument::reset();
    }

    #[test]
    fn setter_only_accessor_is_unobservable() {
        let locator = locator();
        let obj = Object::new();
        obj.define_accessor("sink", Accessor::setter_only(|_, _| {}));
        let err = locator
            .get_observer(&Value::from(obj), "sink")
            .err()
            .unwrap();
        assert!(err.is_unobservable());
        assert!(matches!(
            err,
            ObserveError::UnobservableProperty {
                reason: UnobservableReason::SetterWithoutGetter,
                ..
            }
        ));
    }

    #[test]
    fn disabled_dirty_check_makes_fixed_slots_unobservable() {
        let config = ObserverConfig::default()
            .with_dirty_check(DirtyCheckSettings::default().with_disabled(true));
        let locator = ObserverLocator::new(config);
        let obj = Object::new();
        obj.define_fixed("fixed", 1);
        let err = locator
            .get_observer(&Value::from(obj), "fixed")
            .err()
            .unwrap();
        assert!(err.is_unobservable());
    }

    #[test]
    fn throwing_dirty_check_is_reported() {
        let config = ObserverConfig::default()
            .with_dirty_check(DirtyCheckSettings::default().with_mode(DirtyCheckMode::Throw));
        let locator = ObserverLocator::new(config);
        let obj = Object::new();
        obj.define_fixed("fixed", 1);
        let err = locator
            .get_observer(&Value::from(obj), "fixed")
            .err()
            .unwrap();
        assert!(matches!(err, ObserveError::DirtyCheckEngaged { .. }));
    }

    fn hits(observer: &Rc<dyn PropertyObserver>) -> Rc<Cell<u32>> {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        observer.subscribe(crate::subscriber::from_fn(move |_, _, _| h.set(h.get() + 1)));
        hits
    }

    #[test]
    fn locators_share_the_slot_owner() {
        let first = locator();
        let second = locator();
        let obj = Object::from_pairs([("x", 1)]);
        let target = Value::from(obj.clone());

        let a = first.get_observer(&target, "x").unwrap();
        let a_hits = hits(&a);
        let b = second.get_observer(&target, "x").unwrap();
        assert!(std::ptr::addr_eq(Rc::as_ptr(&a), Rc::as_ptr(&b)));
        let b_hits = hits(&b);

        obj.set("x", 2);
        obj.set("x", 3);
        assert_eq!((a_hits.get(), b_hits.get()), (2, 2));
        assert_eq!(a.get_value(), Value::from(3));
    }

    #[test]
    fn passive_observers_from_two_locators_both_hear_writes() {
        let first = locator();
        let second = locator();
        let obj = Object::from_pairs([("x", 1)]);
        let target = Value::from(obj.clone());
        let a = first.get_observer(&target, "x").unwrap();
        let b = second.get_observer(&target, "x").unwrap();
        assert!(!std::ptr::addr_eq(Rc::as_ptr(&a), Rc::as_ptr(&b)));

        let a_hits = hits(&a);
        let b_hits = hits(&b);
        obj.set("x", 2);
        obj.set("x", 3);
        assert_eq!((a_hits.get(), b_hits.get()), (2, 2));
        assert_eq!(a.get_value(), Value::from(3));
        assert_eq!(b.get_value(), Value::from(3));

        b.set_value(Value::from(4), ChangeFlags::empty()).unwrap();
        assert_eq!((a_hits.get(), b_hits.get()), (3, 3));
        assert_eq!(obj.get("x"), Value::from(4));
    }

    #[test]
    fn computed_in_one_locator_sees_fields_owned_by_another() {
        let first = locator();
        let second = locator();
        let obj = Object::from_pairs([("a", 1)]);
        obj.define_accessor("twice", Accessor::getter(|o, deps| {
            Value::from(deps.get(o, "a").as_number().unwrap_or(0.0) * 2.0)
        }));
        let target = Value::from(obj.clone());
        let field_hits = hits(&first.get_observer(&target, "a").unwrap());
        let computed = second.get_observer(&target, "twice").unwrap();
        let computed_hits = hits(&computed);

        obj.set("a", 5);
        assert_eq!((field_hits.get(), computed_hits.get()), (1, 1));
        assert_eq!(computed.get_value(), Value::from(10));
    }

    #[test]
    fn primitives_are_not_cached() {
        let locator = locator();
        let _ = locator.get_observer(&Value::from(3), "length").unwrap();
        assert_eq!(locator.cached_count(), 0);
    }

    #[test]
    fn dead_targets_are_evicted() {
        let locator = locator();
        let obj = Object::from_pairs([("a", 1)]);
        let _ = locator.get_observer(&Value::from(obj.clone()), "a").unwrap();
        drop(obj);
        locator.prune();
        assert_eq!(locator.cached_count(), 0);
    }

    struct ValueAttribute;

    impl NodeObserverStrategy for ValueAttribute {
        fn handles(&self, _node: &Object, key: &PropertyKey) -> bool {
            key.is_name("value")
        }

        fn create_observer(&self, _node: &Object, _key: &PropertyKey) -> Result<Rc<dyn PropertyObserver>> {
            Ok(PrimitiveObserver::new(Value::from("node"), PropertyKey::from("length")))
        }
    }

    #[test]
    fn host_nodes_use_the_node_strategy() {
        let locator = ObserverLocator::with_node_strategy(ObserverConfig::default(), Rc::new(ValueAttribute));
        let input = Value::from(Object::host("input"));
        assert_eq!(
            locator.get_observer(&input, "value").unwrap().kind(),
            ObserverKind::Primitive
        );
        assert_eq!(
            locator.get_observer(&input, "checked").unwrap().kind(),
            ObserverKind::Setter
        );
        let plain = Value::from(Object::new());
        assert_eq!(
            locator.get_observer(&plain, "value").unwrap().kind(),
            ObserverKind::Setter
        );
    }
}
