#![forbid(unsafe_code)]

//! Derived size observers: `length` of a sequence, `size` of a mapping or
//! set. Both are driven by the owning collection observer after each
//! delivery.

use std::cell::Cell;
use std::rc::Rc;

use crate::collections::{Collection, WeakCollection};
use crate::error::{ObserveError, Result};
use crate::flags::ChangeFlags;
use crate::observer::{ObserverKind, PropertyObserver};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::{PropertyKey, TargetKind, Value};

/// Largest length a sequence accepts through `set_value`.
const MAX_LENGTH: f64 = u32::MAX as f64;

pub struct CollectionLengthObserver {
    collection: WeakCollection,
    target_kind: TargetKind,
    key: PropertyKey,
    value: Cell<usize>,
    subscribers: SubscriberRecord,
}

impl CollectionLengthObserver {
    pub(crate) fn new(collection: WeakCollection, target_kind: TargetKind, len: usize) -> Rc<Self> {
        let key = match target_kind {
            TargetKind::Sequence => "length",
            _ => "size",
        };
        Rc::new(Self {
            collection,
            target_kind,
            key: PropertyKey::from(key),
            value: Cell::new(len),
            subscribers: SubscriberRecord::new(),
        })
    }

    #[must_use]
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    fn live(&self) -> usize {
        self.collection.upgrade().map_or(0, |c| c.len())
    }

    pub(crate) fn handle_size(&self, len: usize, flags: ChangeFlags) {
        let old = self.value.replace(len);
        if old != len {
            self.subscribers
                .notify(&Value::from(len), &Value::from(old), flags);
        }
    }
}

/// Validate a requested sequence length.
fn parse_length(value: &Value) -> Result<usize> {
    match value.as_number() {
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= MAX_LENGTH => {
            Ok(n as usize)
        }
        _ => Err(ObserveError::InvalidLength {
            value: format!("{value:?}"),
        }),
    }
}

impl Subscribable for CollectionLengthObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added && self.subscribers.count() == 1 {
            self.value.set(self.live());
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(self.live())
    }

    /// Truncates or pads a sequence. Sizes of mappings and sets are
    /// read-only.
    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        match self.collection.upgrade() {
            Some(Collection::Sequence(sequence)) => {
                let len = parse_length(&value)?;
                sequence.set_len_with_flags(len, flags);
                Ok(())
            }
            Some(_) => Err(ObserveError::read_only(&self.key)),
            None => Err(ObserveError::missing("set length", "collection")),
        }
    }

    fn kind(&self) -> ObserverKind {
        match self.target_kind {
            TargetKind::Sequence => ObserverKind::CollectionLength,
            _ => ObserverKind::CollectionSize,
        }
    }

    fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}
