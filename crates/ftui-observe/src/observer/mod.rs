#![forbid(unsafe_code)]

//! Property observers.
//!
//! Every observer answers the same contract ([`PropertyObserver`]): read the
//! current value, write a new one, and notify subscribers when the value
//! changes. Which implementation backs a given `(target, key)` is decided
//! once by the [`ObserverLocator`](crate::ObserverLocator):
//!
//! | Strategy | When |
//! |----------|------|
//! | [`SetterObserver`] | plain configurable data slot, or missing key |
//! | [`BindableObserver`] | slot declared bindable |
//! | [`ComputedObserver`] | accessor with a getter |
//! | [`CachedAccessorObserver`] | accessor marked pure |
//! | [`PrimitiveObserver`] | target is a primitive |
//! | [`CollectionLengthObserver`] | `length` of a sequence, `size` of a mapping/set |
//! | [`SequenceIndexObserver`] | an index of a sequence |
//! | [`DirtyCheckProperty`] | anything else, when polling is allowed |

pub mod accessor;
pub mod bindable;
pub mod collection;
pub mod computed;
pub mod dirty_check;
pub mod index;
pub mod length;
pub mod primitive;
pub mod setter;

pub use accessor::PropertyAccessor;
pub use bindable::{BindableDefinition, BindableObserver};
pub use collection::CollectionObserver;
pub use computed::{CachedAccessorObserver, ComputedObserver};
pub use dirty_check::{DirtyCheckProperty, DirtyChecker};
pub use index::SequenceIndexObserver;
pub use length::CollectionLengthObserver;
pub use primitive::PrimitiveObserver;
pub use setter::SetterObserver;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::flags::ChangeFlags;
use crate::subscriber::{Subscribable, Subscriber};
use crate::value::{TargetKind, Value};

/// Which observation strategy backs an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Setter,
    Bindable,
    Computed,
    CachedAccessor,
    Primitive,
    CollectionLength,
    CollectionSize,
    SequenceIndex,
    DirtyCheck,
    /// Supplied by a host node strategy.
    Node,
}

/// Uniform contract for observing one property of one target.
pub trait PropertyObserver: Subscribable {
    /// Current value of the property.
    fn get_value(&self) -> Value;

    /// Write the property through the observer.
    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()>;

    fn kind(&self) -> ObserverKind;

    /// Kind of the observed target.
    fn target_kind(&self) -> TargetKind;

    fn subscriber_count(&self) -> usize;

    /// Whether the locator may cache this observer for its `(target, key)`.
    fn cacheable(&self) -> bool {
        true
    }
}

/// Latest value of an intercepting observer plus its pending batch state.
#[derive(Debug, Default)]
pub(crate) struct ObservedValue {
    pub(crate) value: Value,
    pub(crate) observing: bool,
    pending: Option<(Value, ChangeFlags)>,
}

impl ObservedValue {
    /// Store `value`, returning the old one if it differs.
    pub(crate) fn replace(&mut self, value: Value) -> Option<Value> {
        if self.value == value {
            return None;
        }
        Some(std::mem::replace(&mut self.value, value))
    }

    /// Remember the pre-batch value. Returns `true` on the first deferral,
    /// meaning the caller must queue itself.
    pub(crate) fn defer(&mut self, old: Value, flags: ChangeFlags) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some((old, flags));
        true
    }

    /// Pending `(new, old, flags)` if the value differs from the pre-batch
    /// value.
    pub(crate) fn take_pending(&mut self) -> Option<(Value, Value, ChangeFlags)> {
        let (old, flags) = self.pending.take()?;
        (old != self.value).then(|| (self.value.clone(), old, flags))
    }

    pub(crate) fn discard_pending(&mut self) {
        self.pending = None;
    }
}

/// Link from an intercepting observer to the observer that took over its
/// slot first (typically one created by another locator).
///
/// While linked, the follower reads and writes through the owner and
/// re-broadcasts the owner's notifications to its own subscribers.
#[derive(Default)]
pub(crate) struct SlotOwner(RefCell<Option<Rc<dyn PropertyObserver>>>);

impl SlotOwner {
    pub(crate) fn get(&self) -> Option<Rc<dyn PropertyObserver>> {
        self.0.borrow().clone()
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub(crate) fn follow(&self, owner: Rc<dyn PropertyObserver>, follower: Rc<dyn Subscriber>) {
        owner.subscribe(follower);
        *self.0.borrow_mut() = Some(owner);
    }

    pub(crate) fn detach(&self, follower: &Rc<dyn Subscriber>) {
        let owner = self.0.borrow_mut().take();
        if let Some(owner) = owner {
            owner.unsubscribe(follower);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_value_defers_once_and_nets_out() {
        let mut cell = ObservedValue::default();
        assert_eq!(cell.replace(Value::from(1)), Some(Value::Undefined));
        assert_eq!(cell.replace(Value::from(1)), None);
        assert!(cell.defer(Value::from(1), ChangeFlags::empty()));
        cell.replace(Value::from(2));
        assert!(!cell.defer(Value::from(2), ChangeFlags::empty()));
        cell.replace(Value::from(1));
        assert_eq!(cell.take_pending(), None);
        assert_eq!(cell.take_pending(), None);
    }
}
