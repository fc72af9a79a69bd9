#![forbid(unsafe_code)]

//! Observer over a primitive value.
//!
//! Primitives never change in place, so there is nothing to subscribe to.
//! Only a string's `length` reads as something other than `Undefined`.

use std::rc::Rc;

use crate::error::Result;
use crate::flags::ChangeFlags;
use crate::observer::{ObserverKind, PropertyObserver};
use crate::subscriber::{Subscribable, Subscriber};
use crate::value::{PropertyKey, TargetKind, Value, read_property};

#[derive(Debug)]
pub struct PrimitiveObserver {
    value: Value,
    key: PropertyKey,
}

impl PrimitiveObserver {
    pub(crate) fn new(value: Value, key: PropertyKey) -> Rc<Self> {
        Rc::new(Self { value, key })
    }
}

impl Subscribable for PrimitiveObserver {
    fn subscribe(&self, _subscriber: Rc<dyn Subscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _subscriber: &Rc<dyn Subscriber>) -> bool {
        false
    }
}

impl PropertyObserver for PrimitiveObserver {
    fn get_value(&self) -> Value {
        read_property(&self.value, &self.key)
    }

    /// Writes to a primitive are discarded.
    fn set_value(&self, _value: Value, _flags: ChangeFlags) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Primitive
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Primitive
    }

    fn subscriber_count(&self) -> usize {
        0
    }

    fn cacheable(&self) -> bool {
        false
    }
}
