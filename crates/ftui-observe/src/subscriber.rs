#![forbid(unsafe_code)]

//! Subscriber fan-out attached to every observer.
//!
//! # Design
//!
//! [`SubscriberRecord`] keeps up to three subscribers in fixed slots whose
//! occupancy is tracked by a bitmask, and spills into an overflow `Vec`
//! beyond that. Most observers have zero to three subscribers, so the
//! common case never allocates.
//!
//! Subscribers are compared by `Rc` identity; no subscriber is stored twice.
//!
//! # Re-entrancy
//!
//! `notify` snapshots the slots and the overflow list before calling out.
//! A subscriber that adds or removes subscribers during the round does not
//! disturb the iteration: subscribers removed mid-round still receive this
//! round, subscribers added mid-round wait for the next one.
//!
//! # Failure Modes
//!
//! - **Subscriber panic**: not caught. Later subscribers in the same round
//!   are not notified.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::value::Value;

/// Receiver of change notifications.
pub trait Subscriber {
    /// A property value changed from `old` to `new`.
    fn handle_change(&self, new: &Value, old: &Value, flags: ChangeFlags) {
        let _ = (new, old, flags);
    }

    /// A collection changed; `index_map` describes the structural diff.
    fn handle_collection_change(&self, index_map: &IndexMap, flags: ChangeFlags) {
        let _ = (index_map, flags);
    }
}

/// Anything subscribers can attach to.
pub trait Subscribable {
    /// Returns `false` if `subscriber` was already registered.
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool;
    /// Returns `false` if `subscriber` was not registered.
    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool;
}

#[inline]
pub(crate) fn same_subscriber(a: &Rc<dyn Subscriber>, b: &Rc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

bitflags::bitflags! {
    /// Occupancy of the fixed subscriber slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct SlotMask: u8 {
        const S0 = 0b001;
        const S1 = 0b010;
        const S2 = 0b100;
    }
}

const FIXED_SLOTS: [SlotMask; 3] = [SlotMask::S0, SlotMask::S1, SlotMask::S2];

/// Fixed-slot plus overflow subscriber list.
#[derive(Default)]
pub struct SubscriberRecord {
    mask: Cell<SlotMask>,
    slots: [RefCell<Option<Rc<dyn Subscriber>>>; 3],
    overflow: RefCell<Vec<Rc<dyn Subscriber>>>,
    count: Cell<usize>,
}

impl SubscriberRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber`. Returns `false` if it is already present.
    pub fn add(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        if self.has(&subscriber) {
            return false;
        }
        let mask = self.mask.get();
        if let Some((index, bit)) = FIXED_SLOTS
            .iter()
            .enumerate()
            .find(|(_, bit)| !mask.contains(**bit))
        {
            *self.slots[index].borrow_mut() = Some(subscriber);
            self.mask.set(mask | *bit);
        } else {
            self.overflow.borrow_mut().push(subscriber);
        }
        self.count.set(self.count.get() + 1);
        true
    }

    /// Remove `subscriber`. Returns `false` if it was not present.
    pub fn remove(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let mask = self.mask.get();
        for (index, bit) in FIXED_SLOTS.iter().enumerate() {
            if !mask.contains(*bit) {
                continue;
            }
            let mut slot = self.slots[index].borrow_mut();
            if slot.as_ref().is_some_and(|s| same_subscriber(s, subscriber)) {
                *slot = None;
                self.mask.set(mask - *bit);
                self.count.set(self.count.get() - 1);
                return true;
            }
        }
        let mut overflow = self.overflow.borrow_mut();
        if let Some(position) = overflow.iter().position(|s| same_subscriber(s, subscriber)) {
            overflow.remove(position);
            self.count.set(self.count.get() - 1);
            return true;
        }
        false
    }

    #[must_use]
    pub fn has(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let mask = self.mask.get();
        let in_slots = FIXED_SLOTS.iter().enumerate().any(|(index, bit)| {
            mask.contains(*bit)
                && self.slots[index]
                    .borrow()
                    .as_ref()
                    .is_some_and(|s| same_subscriber(s, subscriber))
        });
        in_slots
            || self
                .overflow
                .borrow()
                .iter()
                .any(|s| same_subscriber(s, subscriber))
    }

    /// Whether any subscriber is registered.
    #[must_use]
    pub fn any(&self) -> bool {
        self.count.get() > 0
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Deliver a value change to every subscriber registered right now.
    pub fn notify(&self, new: &Value, old: &Value, flags: ChangeFlags) {
        for subscriber in self.snapshot().iter() {
            subscriber.handle_change(new, old, flags);
        }
    }

    /// Deliver a collection change to every subscriber registered right now.
    pub fn notify_collection(&self, index_map: &IndexMap, flags: ChangeFlags) {
        for subscriber in self.snapshot().iter() {
            subscriber.handle_collection_change(index_map, flags);
        }
    }

    /// Fixed slots copied inline; the overflow list is cloned only when it
    /// holds anyone.
    fn snapshot(&self) -> Round {
        let mask = self.mask.get();
        let mut fixed: [Option<Rc<dyn Subscriber>>; 3] = [None, None, None];
        for (index, bit) in FIXED_SLOTS.iter().enumerate() {
            if mask.contains(*bit) {
                fixed[index] = self.slots[index].borrow().clone();
            }
        }
        let overflow = self.overflow.borrow();
        let overflow = if overflow.is_empty() {
            Vec::new()
        } else {
            overflow.clone()
        };
        Round { fixed, overflow }
    }
}

/// Subscribers of one notification round: fixed slots first, then overflow
/// in registration order.
struct Round {
    fixed: [Option<Rc<dyn Subscriber>>; 3],
    overflow: Vec<Rc<dyn Subscriber>>,
}

impl Round {
    fn iter(&self) -> impl Iterator<Item = &Rc<dyn Subscriber>> {
        self.fixed.iter().flatten().chain(&self.overflow)
    }
}

impl std::fmt::Debug for SubscriberRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRecord")
            .field("count", &self.count.get())
            .field("overflow", &self.overflow.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Closure subscribers
// ---------------------------------------------------------------------------

struct FnSubscriber<F>(F);

impl<F: Fn(&Value, &Value, ChangeFlags)> Subscriber for FnSubscriber<F> {
    fn handle_change(&self, new: &Value, old: &Value, flags: ChangeFlags) {
        (self.0)(new, old, flags);
    }
}

struct FnCollectionSubscriber<F>(F);

impl<F: Fn(&IndexMap, ChangeFlags)> Subscriber for FnCollectionSubscriber<F> {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: ChangeFlags) {
        (self.0)(index_map, flags);
    }
}

/// Subscriber that runs `f(new, old, flags)` on value changes.
pub fn from_fn(f: impl Fn(&Value, &Value, ChangeFlags) + 'static) -> Rc<dyn Subscriber> {
    Rc::new(FnSubscriber(f))
}

/// Subscriber that runs `f(index_map, flags)` on collection changes.
pub fn from_collection_fn(f: impl Fn(&IndexMap, ChangeFlags) + 'static) -> Rc<dyn Subscriber> {
    Rc::new(FnCollectionSubscriber(f))
}

// ---------------------------------------------------------------------------
// Subscription guard
// ---------------------------------------------------------------------------

/// RAII guard that unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    source: Rc<dyn Subscribable>,
    subscriber: Rc<dyn Subscriber>,
}

impl Subscription {
    /// Subscribe `subscriber` to `source`, keeping it registered for the
    /// lifetime of the guard.
    pub fn new(source: Rc<dyn Subscribable>, subscriber: Rc<dyn Subscriber>) -> Self {
        source.subscribe(Rc::clone(&subscriber));
        Self { source, subscriber }
    }

    #[must_use]
    pub fn subscriber(&self) -> &Rc<dyn Subscriber> {
        &self.subscriber
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.source.unsubscribe(&self.subscriber);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, Rc<dyn Subscriber>) {
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        (hits, from_fn(move |_, _, _| h.set(h.get() + 1)))
    }

    #[test]
    fn add_remove_has() {
        let record = SubscriberRecord::new();
        let (_, a) = counter();
        assert!(!record.any());
        assert!(record.add(Rc::clone(&a)));
        assert!(record.has(&a));
        assert!(record.any());
        assert!(record.remove(&a));
        assert!(!record.has(&a));
        assert!(!record.remove(&a));
        assert_eq!(record.count(), 0);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let record = SubscriberRecord::new();
        let (hits, a) = counter();
        assert!(record.add(Rc::clone(&a)));
        assert!(!record.add(Rc::clone(&a)));
        record.notify(&Value::from(1), &Value::Undefined, ChangeFlags::empty());
        assert_eq!(hits.get(), 1);
        assert_eq!(record.count(), 1);
    }

    #[test]
    fn overflow_beyond_three() {
        let record = SubscriberRecord::new();
        let subs: Vec<_> = (0..6).map(|_| counter()).collect();
        for (_, s) in &subs {
            assert!(record.add(Rc::clone(s)));
        }
        assert_eq!(record.count(), 6);
        assert!(record.remove(&subs[1].1));
        assert!(record.remove(&subs[4].1));
        record.notify(&Value::Null, &Value::Undefined, ChangeFlags::empty());
        let hits: Vec<u32> = subs.iter().map(|(h, _)| h.get()).collect();
        assert_eq!(hits, vec![1, 0, 1, 1, 0, 1]);
    }

    #[test]
    fn fixed_slot_rounds_leave_overflow_unallocated() {
        let record = SubscriberRecord::new();
        let subs: Vec<_> = (0..3).map(|_| counter()).collect();
        for (_, s) in &subs {
            record.add(Rc::clone(s));
        }
        let round = record.snapshot();
        assert_eq!(round.overflow.capacity(), 0);
        assert_eq!(round.iter().count(), 3);

        let (_, extra) = counter();
        record.add(extra);
        let round = record.snapshot();
        assert_eq!(round.overflow.len(), 1);
        assert_eq!(round.iter().count(), 4);
    }

    #[test]
    fn freed_slot_is_reused() {
        let record = SubscriberRecord::new();
        let subs: Vec<_> = (0..3).map(|_| counter()).collect();
        for (_, s) in &subs {
            record.add(Rc::clone(s));
        }
        record.remove(&subs[0].1);
        let (_, late) = counter();
        record.add(Rc::clone(&late));
        assert!(record.overflow.borrow().is_empty());
        assert!(record.has(&late));
    }

    #[test]
    fn removal_mid_round_still_delivers_this_round() {
        let record = Rc::new(SubscriberRecord::new());
        let (victim_hits, victim) = counter();
        let r = Rc::clone(&record);
        let v = Rc::clone(&victim);
        let remover = from_fn(move |_, _, _| {
            r.remove(&v);
        });
        record.add(remover);
        record.add(Rc::clone(&victim));

        record.notify(&Value::from(1), &Value::Undefined, ChangeFlags::empty());
        assert_eq!(victim_hits.get(), 1);
        record.notify(&Value::from(2), &Value::from(1), ChangeFlags::empty());
        assert_eq!(victim_hits.get(), 1);
    }

    #[test]
    fn addition_mid_round_waits_for_next_round() {
        let record = Rc::new(SubscriberRecord::new());
        let (late_hits, late) = counter();
        let r = Rc::clone(&record);
        let l = Rc::clone(&late);
        record.add(from_fn(move |_, _, _| {
            r.add(Rc::clone(&l));
        }));
        // Fill the remaining slots so the late subscriber lands in overflow.
        record.add(counter().1);
        record.add(counter().1);
        record.add(counter().1);

        record.notify(&Value::from(1), &Value::Undefined, ChangeFlags::empty());
        assert_eq!(late_hits.get(), 0);
        record.notify(&Value::from(2), &Value::from(1), ChangeFlags::empty());
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn flags_pass_through() {
        let record = SubscriberRecord::new();
        let seen = Rc::new(Cell::new(ChangeFlags::empty()));
        let s = Rc::clone(&seen);
        record.add(from_fn(move |_, _, flags| s.set(flags)));
        let flags = ChangeFlags::FROM_BIND | ChangeFlags::from_bits_retain(1 << 20);
        record.notify(&Value::Null, &Value::Null, flags);
        assert_eq!(seen.get(), flags);
    }

    #[test]
    fn collection_notifications_reach_collection_subscribers() {
        let record = SubscriberRecord::new();
        let lens = Rc::new(Cell::new(0usize));
        let l = Rc::clone(&lens);
        record.add(from_collection_fn(move |map, _| l.set(map.len())));
        record.notify_collection(&IndexMap::identity(4), ChangeFlags::empty());
        assert_eq!(lens.get(), 4);
    }

    struct Source(SubscriberRecord);

    impl Subscribable for Source {
        fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
            self.0.add(subscriber)
        }
        fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
            self.0.remove(subscriber)
        }
    }

    #[test]
    fn subscription_guard_unsubscribes_on_drop() {
        let source = Rc::new(Source(SubscriberRecord::new()));
        let (hits, sub) = counter();
        {
            let _guard = Subscription::new(source.clone(), sub);
            source.0.notify(&Value::from(1), &Value::Undefined, ChangeFlags::empty());
        }
        source.0.notify(&Value::from(2), &Value::from(1), ChangeFlags::empty());
        assert_eq!(hits.get(), 1);
        assert!(!source.0.any());
    }
}
