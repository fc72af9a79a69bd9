#![forbid(unsafe_code)]

//! Per-index observer of a sequence.
//!
//! Subscribes to its collection observer while it has subscribers of its
//! own. On each collection change it re-reads only if its position was
//! touched, meaning the entry at its index is not `Prior(index)`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::collections::WeakSequence;
use crate::error::{ObserveError, Result};
use crate::flags::ChangeFlags;
use crate::index_map::{IndexEntry, IndexMap};
use crate::observer::collection::CollectionObserver;
use crate::observer::{ObserverKind, PropertyObserver};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::{TargetKind, Value};

pub struct SequenceIndexObserver {
    owner: Weak<CollectionObserver>,
    sequence: WeakSequence,
    index: usize,
    value: RefCell<Value>,
    subscribers: SubscriberRecord,
    this: Weak<SequenceIndexObserver>,
}

impl SequenceIndexObserver {
    pub(crate) fn new(owner: Weak<CollectionObserver>, sequence: WeakSequence, index: usize) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            owner,
            sequence,
            index,
            value: RefCell::new(Value::Undefined),
            subscribers: SubscriberRecord::new(),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    fn live(&self) -> Value {
        self.sequence
            .upgrade()
            .map(|s| s.get(self.index))
            .unwrap_or_default()
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.this.upgrade().map(|this| this as Rc<dyn Subscriber>)
    }
}

impl Subscriber for SequenceIndexObserver {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: ChangeFlags) {
        if index_map.get(self.index) == Some(IndexEntry::Prior(self.index)) {
            return;
        }
        let new = self.live();
        let old = std::mem::replace(&mut *self.value.borrow_mut(), new.clone());
        if new != old {
            self.subscribers.notify(&new, &old, flags);
        }
    }
}

impl Subscribable for SequenceIndexObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added && self.subscribers.count() == 1 {
            *self.value.borrow_mut() = self.live();
            if let (Some(owner), Some(this)) = (self.owner.upgrade(), self.as_subscriber()) {
                owner.subscribe(this);
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed
            && !self.subscribers.any()
            && let (Some(owner), Some(this)) = (self.owner.upgrade(), self.as_subscriber())
        {
            owner.unsubscribe(&this);
        }
        removed
    }
}

impl PropertyObserver for SequenceIndexObserver {
    fn get_value(&self) -> Value {
        self.live()
    }

    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        let sequence = self
            .sequence
            .upgrade()
            .ok_or_else(|| ObserveError::missing("set index", "sequence"))?;
        sequence.set_with_flags(self.index, value, flags);
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::SequenceIndex
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Sequence
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}
