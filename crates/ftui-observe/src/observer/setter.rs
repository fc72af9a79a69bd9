#![forbid(unsafe_code)]

//! Observer for plain data slots.
//!
//! A [`SetterObserver`] starts passive: reads and writes go straight to the
//! object. The first subscription takes over the slot, after which every
//! assignment (through the object or through the observer) updates the
//! observer's cached value and notifies on change. [`SetterObserver::stop`]
//! hands the slot back as a plain data slot holding the latest value.
//!
//! A slot already taken over by another observer (one built by a different
//! locator) is not stolen: this observer follows the owner instead, reading
//! and writing through it and relaying its notifications.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::batch::{self, BatchFlush};
use crate::error::{ObserveError, Result};
use crate::flags::ChangeFlags;
use crate::observer::{ObservedValue, ObserverKind, PropertyObserver, SlotOwner};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::{Object, PropertyKey, SlotInterceptor, TargetKind, Value, WeakObject};

pub struct SetterObserver {
    target: WeakObject,
    key: PropertyKey,
    state: RefCell<ObservedValue>,
    owner: SlotOwner,
    subscribers: SubscriberRecord,
    this: Weak<SetterObserver>,
}

impl SetterObserver {
    pub(crate) fn new(target: &Object, key: PropertyKey) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            target: target.downgrade(),
            key,
            state: RefCell::new(ObservedValue::default()),
            owner: SlotOwner::default(),
            subscribers: SubscriberRecord::new(),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// Whether the observer owns the slot or follows its owner.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.state.borrow().observing || self.owner.is_linked()
    }

    /// Take over the slot. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.is_observing() {
            return Ok(());
        }
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("start observing", "target object"))?;
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| ObserveError::missing("start observing", "observer"))?;
        let current = target.get(&self.key);
        match target.intercept(&self.key, Rc::clone(&this) as _, Rc::clone(&this) as _) {
            Ok(_) => {
                let mut state = self.state.borrow_mut();
                state.value = current;
                state.observing = true;
                trace!(key = %self.key, "setter observer started");
            }
            Err(owner) => {
                self.owner.follow(owner, this);
                trace!(key = %self.key, "setter observer following slot owner");
            }
        }
        Ok(())
    }

    /// Release the slot back to a plain data slot. Idempotent.
    pub fn stop(&self) {
        if self.owner.is_linked() {
            if let Some(this) = self.this.upgrade() {
                self.owner.detach(&(this as Rc<dyn Subscriber>));
            }
            return;
        }
        let value = {
            let mut state = self.state.borrow_mut();
            if !state.observing {
                return;
            }
            state.observing = false;
            state.discard_pending();
            state.value.clone()
        };
        if let Some(target) = self.target.upgrade() {
            target.release(&self.key, value, None);
        }
        trace!(key = %self.key, "setter observer stopped");
    }

    fn assign(&self, value: Value, flags: ChangeFlags) {
        let Some(old) = self.state.borrow_mut().replace(value) else {
            return;
        };
        if batch::is_batching() {
            let first = self.state.borrow_mut().defer(old, flags);
            if first && let Some(this) = self.this.upgrade() {
                batch::enqueue(this);
            }
            return;
        }
        let new = self.state.borrow().value.clone();
        self.subscribers.notify(&new, &old, flags);
    }
}

impl SlotInterceptor for SetterObserver {
    fn current(&self) -> Value {
        self.state.borrow().value.clone()
    }

    fn assign(&self, value: Value, flags: ChangeFlags) {
        SetterObserver::assign(self, value, flags);
    }
}

impl Subscriber for SetterObserver {
    /// Relay from the slot owner.
    fn handle_change(&self, new: &Value, old: &Value, flags: ChangeFlags) {
        self.subscribers.notify(new, old, flags);
    }
}

impl BatchFlush for SetterObserver {
    fn flush_batch(&self) {
        let pending = self.state.borrow_mut().take_pending();
        if let Some((new, old, flags)) = pending {
            self.subscribers.notify(&new, &old, flags);
        }
    }

    fn discard_batch(&self) {
        self.state.borrow_mut().discard_pending();
    }
}

impl Subscribable for SetterObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        if !self.is_observing()
            && let Err(err) = self.start()
        {
            trace!(key = %self.key, %err, "subscribing to unobservable setter");
        }
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && !self.subscribers.any() && self.owner.is_linked() {
            self.stop();
        }
        removed
    }
}

impl PropertyObserver for SetterObserver {
    fn get_value(&self) -> Value {
        if let Some(owner) = self.owner.get() {
            return owner.get_value();
        }
        if self.is_observing() {
            return self.state.borrow().value.clone();
        }
        self.target
            .upgrade()
            .map(|target| target.get(&self.key))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        if let Some(owner) = self.owner.get() {
            return owner.set_value(value, flags);
        }
        if self.is_observing() {
            self.assign(value, flags);
            return Ok(());
        }
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("set value", "target object"))?;
        target.set_with_flags(&self.key, value, flags);
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Setter
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
    use crate::subscriber::from_fn;
    use std::cell::RefCell as StdRefCell;

    type Log = Rc<StdRefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Log, Rc<dyn Subscriber>) {
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);
        let sub = from_fn(move |new, old, _| sink.borrow_mut().push((new.clone(), old.clone())));
        (log, sub)
    }

    #[test]
    fn passive_until_subscribed() {
        let obj = Object::from_pairs([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a".into());
        assert!(!observer.is_observing());
        observer.set_value(Value::from(2), ChangeFlags::empty()).unwrap();
        assert_eq!(obj.get("a"), Value::from(2));
        assert_eq!(observer.get_value(), Value::from(2));
    }

    #[test]
    fn native_assignment_notifies_once_per_change() {
        let obj = Object::from_pairs([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a".into());
        let (log, sub) = recorder();
        observer.subscribe(sub);

        obj.set("a", 2);
        obj.set("a", 2);
        observer.set_value(Value::from(3), ChangeFlags::empty()).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (Value::from(2), Value::from(1)),
                (Value::from(3), Value::from(2)),
            ]
        );
        assert_eq!(obj.get("a"), Value::from(3));
    }

    #[test]
    fn batch_reports_net_change() {
        let obj = Object::from_pairs([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a".into());
        let (log, sub) = recorder();
        observer.subscribe(sub);

        batch::batch(|| {
            obj.set("a", 2);
            obj.set("a", 3);
            assert!(log.borrow().is_empty());
        });
        assert_eq!(*log.borrow(), vec![(Value::from(3), Value::from(1))]);

        batch::batch(|| {
            obj.set("a", 4);
            obj.set("a", 3);
        });
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn stop_releases_slot_with_latest_value() {
        let obj = Object::from_pairs([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a".into());
        let (log, sub) = recorder();
        observer.subscribe(sub);
        obj.set("a", 5);
        observer.stop();
        obj.set("a", 6);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(obj.get("a"), Value::from(6));
    }

    #[test]
    fn missing_key_starts_undefined() {
        let obj = Object::new();
        let observer = SetterObserver::new(&obj, "later".into());
        let (log, sub) = recorder();
        observer.subscribe(sub);
        obj.set("later", "now");
        assert_eq!(
            *log.borrow(),
            vec![(Value::from("now"), Value::Undefined)]
        );
    }
}
