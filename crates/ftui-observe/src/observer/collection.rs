#![forbid(unsafe_code)]

//! One observer per collection instance.
//!
//! The instrumented collection operations record their structural delta
//! into the observer's pending [`IndexMap`] and call
//! [`notify`](CollectionObserver::notify). Outside a batch the map is
//! delivered immediately; inside one, the observer queues itself once and
//! delivers the accumulated map when the batch closes.
//!
//! Delivery hands subscribers the pending map and starts a fresh identity
//! map for the current size, then updates the derived `length`/`size`
//! observer. Flags of every change recorded since the last delivery are
//! combined and passed along with it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::batch::{self, BatchFlush};
use crate::collections::{Collection, WeakCollection};
use crate::flags::ChangeFlags;
use crate::index_map::IndexMap;
use crate::observer::index::SequenceIndexObserver;
use crate::observer::length::CollectionLengthObserver;
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::TargetKind;

pub struct CollectionObserver {
    collection: WeakCollection,
    kind: TargetKind,
    index_map: RefCell<IndexMap>,
    flags: Cell<ChangeFlags>,
    queued: Cell<bool>,
    subscribers: SubscriberRecord,
    length: RefCell<Option<Rc<CollectionLengthObserver>>>,
    indices: RefCell<AHashMap<usize, Rc<SequenceIndexObserver>>>,
    this: Weak<CollectionObserver>,
}

impl CollectionObserver {
    pub(crate) fn new(collection: &Collection) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            collection: collection.downgrade(),
            kind: collection.kind(),
            index_map: RefCell::new(IndexMap::identity(collection.len())),
            flags: Cell::new(ChangeFlags::empty()),
            queued: Cell::new(false),
            subscribers: SubscriberRecord::new(),
            length: RefCell::new(None),
            indices: RefCell::new(AHashMap::new()),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// The observed collection, if still alive.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        self.collection.upgrade()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }

    /// Changes recorded since the last delivery.
    #[must_use]
    pub fn pending(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    fn current_len(&self) -> usize {
        self.collection.upgrade().map_or(0, |c| c.len())
    }

    pub(crate) fn record(&self, flags: ChangeFlags, record: impl FnOnce(&mut IndexMap)) {
        self.flags.set(self.flags.get() | flags);
        record(&mut *self.index_map.borrow_mut());
    }

    /// Forget unrecorded history; the next delivery starts from the
    /// current state.
    pub(crate) fn reset_index_map(&self) {
        self.flags.set(ChangeFlags::empty());
        *self.index_map.borrow_mut() = IndexMap::identity(self.current_len());
    }

    /// Deliver the pending changes now, or at the end of the open batch.
    pub fn notify(&self) {
        if batch::is_batching() {
            if !self.queued.replace(true)
                && let Some(this) = self.this.upgrade()
            {
                batch::enqueue(this);
            }
            return;
        }
        self.deliver();
    }

    fn deliver(&self) {
        let len = self.current_len();
        let map = std::mem::replace(&mut *self.index_map.borrow_mut(), IndexMap::identity(len));
        let flags = self.flags.replace(ChangeFlags::empty());
        self.subscribers.notify_collection(&map, flags);
        let length = self.length.borrow().clone();
        if let Some(length) = length {
            length.handle_size(len, flags);
        }
    }

    /// The derived `length` (sequences) or `size` (mappings, sets) observer.
    #[must_use]
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        let mut slot = self.length.borrow_mut();
        Rc::clone(slot.get_or_insert_with(|| {
            CollectionLengthObserver::new(self.collection.clone(), self.kind, self.current_len())
        }))
    }

    /// Observer for one index of a sequence. `None` for mappings and sets,
    /// and once the sequence is gone.
    #[must_use]
    pub fn index_observer(&self, index: usize) -> Option<Rc<SequenceIndexObserver>> {
        let WeakCollection::Sequence(sequence) = &self.collection else {
            return None;
        };
        sequence.upgrade()?;
        let mut indices = self.indices.borrow_mut();
        let observer = indices
            .entry(index)
            .or_insert_with(|| SequenceIndexObserver::new(self.this.clone(), sequence.clone(), index));
        Some(Rc::clone(observer))
    }
}

impl BatchFlush for CollectionObserver {
    fn flush_batch(&self) {
        self.queued.set(false);
        self.deliver();
    }

    fn discard_batch(&self) {
        self.queued.set(false);
        self.reset_index_map();
    }
}

impl Subscribable for CollectionObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }
}

impl fmt::Debug for CollectionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("kind", &self.kind)
            .field("subscribers", &self.subscribers.count())
            .field("queued", &self.queued.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{Mapping, Sequence, ValueSet};
    use crate::index_map::IndexEntry::{Created, Prior};
    use crate::instrument;
    use crate::subscriber::from_collection_fn;
    use crate::value::Value;

    type Maps = Rc<RefCell<Vec<IndexMap>>>;

    fn observe(collection: impl Into<Collection>) -> (Rc<CollectionObserver>, Maps) {
        let observer = instrument::observer_for(&collection.into());
        let maps: Maps = Rc::default();
        let sink = Rc::clone(&maps);
        observer.subscribe(from_collection_fn(move |map, _| {
            sink.borrow_mut().push(map.clone());
        }));
        (observer, maps)
    }

    fn seq(values: &[i32]) -> Sequence {
        Sequence::from_values(values.iter().copied().map(Value::from))
    }

    #[test]
    fn push_and_splice_record_positions() {
        instrument::reset();
        let items = seq(&[1, 2, 3]);
        let (_observer, maps) = observe(&items);

        items.push(4);
        items.splice(1, Some(1), [Value::from(9), Value::from(8)]);

        let maps = maps.borrow();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].entries(), &[Prior(0), Prior(1), Prior(2), Created]);
        assert_eq!(
            maps[1].entries(),
            &[Prior(0), Created, Created, Prior(2), Prior(3)]
        );
        assert_eq!(maps[1].deleted_indices(), &[1]);
        assert_eq!(maps[1].deleted_items(), &[Value::from(2)]);
        instrument::reset();
    }

    #[test]
    fn batch_delivers_net_effect_once() {
        instrument::reset();
        let items = seq(&[1, 2, 3]);
        let (_observer, maps) = observe(&items);

        batch::batch(|| {
            items.shift();
            items.push(4);
            items.reverse();
        });

        let maps = maps.borrow();
        assert_eq!(maps.len(), 1);
        // [2, 3, 4] reversed: 4 is new, 3 was at 2, 2 was at 1.
        assert_eq!(maps[0].entries(), &[Created, Prior(2), Prior(1)]);
        assert_eq!(maps[0].deleted_indices(), &[0]);
        instrument::reset();
    }

    #[test]
    fn sort_records_permutation() {
        instrument::reset();
        let items = seq(&[3, 1, 2]);
        let (_observer, maps) = observe(&items);
        items.sort_by(|a, b| {
            a.as_number()
                .unwrap_or_default()
                .total_cmp(&b.as_number().unwrap_or_default())
        });
        assert_eq!(maps.borrow()[0].entries(), &[Prior(1), Prior(2), Prior(0)]);

        items.sort_by(|a, b| {
            a.as_number()
                .unwrap_or_default()
                .total_cmp(&b.as_number().unwrap_or_default())
        });
        assert_eq!(maps.borrow().len(), 1);
        instrument::reset();
    }

    #[test]
    fn mapping_replace_records_key() {
        instrument::reset();
        let map = Mapping::from_entries([("a", 1), ("b", 2)]);
        let (_observer, maps) = observe(&map);
        map.set("b", 3);
        map.set("b", 3);
        map.delete(&Value::from("a"));

        let maps = maps.borrow();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].entries(), &[Prior(0), Created]);
        assert_eq!(maps[0].deleted_items(), &[Value::from("b")]);
        assert_eq!(maps[1].entries(), &[Prior(1)]);
        assert_eq!(maps[1].deleted_indices(), &[0]);
        instrument::reset();
    }

    #[test]
    fn set_clear_reports_every_member() {
        instrument::reset();
        let set = ValueSet::from_values([Value::from(1), Value::from(2)]);
        let (_observer, maps) = observe(&set);
        set.add(3);
        set.clear();
        set.clear();

        let maps = maps.borrow();
        assert_eq!(maps.len(), 2);
        assert!(maps[1].is_empty());
        assert_eq!(maps[1].deleted_indices(), &[0, 1, 2]);
        instrument::reset();
    }

    #[test]
    fn uninstalled_operations_are_silent_and_reinstall_resets() {
        instrument::reset();
        let items = seq(&[1]);
        let (observer, maps) = observe(&items);
        instrument::uninstall();
        items.push(2);
        assert!(maps.borrow().is_empty());

        instrument::install();
        assert!(observer.pending().is_identity());
        assert_eq!(observer.pending().len(), 2);
        items.pop();
        assert_eq!(maps.borrow()[0].deleted_indices(), &[1]);
        instrument::reset();
    }

    #[test]
    fn index_observers_only_for_sequences() {
        instrument::reset();
        let items = seq(&[1]);
        let observer = instrument::observer_for(&items.clone().into());
        let a = observer.index_observer(0);
        let b = observer.index_observer(0);
        assert!(a.is_some());
        assert!(Rc::ptr_eq(&a.unwrap(), &b.unwrap()));

        let set = ValueSet::new();
        let observer = instrument::observer_for(&set.clone().into());
        assert!(observer.index_observer(0).is_none());
        instrument::reset();
    }
}
