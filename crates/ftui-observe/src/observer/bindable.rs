#![forbid(unsafe_code)]

//! Observer for declared component bindables.
//!
//! A bindable slot carries a [`BindableDefinition`]: an optional coercion
//! applied to every incoming value, an optional per-property change
//! callback, and an optional catch-all callback. Callbacks run synchronously
//! on every effective change, before (and independently of) subscriber
//! notification, so they also fire inside a batch. Writes flagged
//! [`ChangeFlags::BIND_COMMIT`] skip the callbacks.
//!
//! As with [`SetterObserver`](crate::observer::SetterObserver), a slot
//! already owned by another observer is followed rather than taken over, so
//! the callbacks run once per write.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::batch::{self, BatchFlush};
use crate::error::{ObserveError, Result};
use crate::flags::ChangeFlags;
use crate::observer::{ObservedValue, ObserverKind, PropertyObserver, SlotOwner};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::{Object, PropertyKey, SlotInterceptor, TargetKind, Value, WeakObject};

/// `(component, new, old)`
pub type ChangeHandler = Rc<dyn Fn(&Object, &Value, &Value)>;
/// `(component, key, new, old)`
pub type AnyChangeHandler = Rc<dyn Fn(&Object, &PropertyKey, &Value, &Value)>;
pub type Coercer = Rc<dyn Fn(Value) -> Value>;

/// Hooks declared for one bindable property.
#[derive(Clone, Default)]
pub struct BindableDefinition {
    pub(crate) changed: Option<ChangeHandler>,
    pub(crate) any_changed: Option<AnyChangeHandler>,
    pub(crate) coerce: Option<Coercer>,
}

impl BindableDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_change(mut self, f: impl Fn(&Object, &Value, &Value) + 'static) -> Self {
        self.changed = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_any_change(
        mut self,
        f: impl Fn(&Object, &PropertyKey, &Value, &Value) + 'static,
    ) -> Self {
        self.any_changed = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn coerce_with(mut self, f: impl Fn(Value) -> Value + 'static) -> Self {
        self.coerce = Some(Rc::new(f));
        self
    }

    /// Whether any change callback is declared.
    #[must_use]
    pub fn has_callbacks(&self) -> bool {
        self.changed.is_some() || self.any_changed.is_some()
    }

    fn coerce(&self, value: Value) -> Value {
        match &self.coerce {
            Some(coerce) => coerce(value),
            None => value,
        }
    }
}

impl fmt::Debug for BindableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableDefinition")
            .field("changed", &self.changed.is_some())
            .field("any_changed", &self.any_changed.is_some())
            .field("coerce", &self.coerce.is_some())
            .finish()
    }
}

pub struct BindableObserver {
    target: WeakObject,
    key: PropertyKey,
    definition: BindableDefinition,
    state: RefCell<ObservedValue>,
    owner: SlotOwner,
    subscribers: SubscriberRecord,
    this: Weak<BindableObserver>,
}

impl BindableObserver {
    /// Observer for bindable `key` of `target`. Bindables with callbacks are
    /// intercepted immediately so that every write reaches the callbacks.
    pub(crate) fn new(target: &Object, key: PropertyKey, definition: BindableDefinition) -> Rc<Self> {
        let observer = Rc::new_cyclic(|this| Self {
            target: target.downgrade(),
            key,
            definition,
            state: RefCell::new(ObservedValue::default()),
            owner: SlotOwner::default(),
            subscribers: SubscriberRecord::new(),
            this: this.clone(),
        });
        if observer.definition.has_callbacks() {
            observer.intercept(target);
        }
        observer
    }

    #[must_use]
    pub fn definition(&self) -> &BindableDefinition {
        &self.definition
    }

    /// Whether the observer owns the slot or follows its owner.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.state.borrow().observing || self.owner.is_linked()
    }

    fn intercept(&self, target: &Object) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let current = target.get(&self.key);
        match target.intercept(&self.key, Rc::clone(&this) as _, Rc::clone(&this) as _) {
            Ok(_) => {
                let mut state = self.state.borrow_mut();
                state.value = current;
                state.observing = true;
                trace!(key = %self.key, "bindable observer started");
            }
            Err(owner) => {
                self.owner.follow(owner, this);
                trace!(key = %self.key, "bindable observer following slot owner");
            }
        }
    }

    /// Take over the slot. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.is_observing() {
            return Ok(());
        }
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| ObserveError::missing("start observing", "component"))?;
        self.intercept(&target);
        Ok(())
    }

    /// Release the slot. The declared definition stays attached to it.
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
            target.release(&self.key, value, Some(self.definition.clone()));
        }
    }

    fn assign(&self, value: Value, flags: ChangeFlags) {
        let value = self.definition.coerce(value);
        let Some(old) = self.state.borrow_mut().replace(value) else {
            return;
        };
        let new = self.state.borrow().value.clone();

        if !flags.contains(ChangeFlags::BIND_COMMIT)
            && let Some(component) = self.target.upgrade()
        {
            if let Some(changed) = &self.definition.changed {
                changed(&component, &new, &old);
            }
            if let Some(any_changed) = &self.definition.any_changed {
                any_changed(&component, &self.key, &new, &old);
            }
        }

        if batch::is_batching() {
            let first = self.state.borrow_mut().defer(old, flags);
            if first && let Some(this) = self.this.upgrade() {
                batch::enqueue(this);
            }
            return;
        }
        self.subscribers.notify(&new, &old, flags);
    }
}

impl SlotInterceptor for BindableObserver {
    fn current(&self) -> Value {
        self.state.borrow().value.clone()
    }

    fn assign(&self, value: Value, flags: ChangeFlags) {
        BindableObserver::assign(self, value, flags);
    }
}

impl Subscriber for BindableObserver {
    /// Relay from the slot owner.
    fn handle_change(&self, new: &Value, old: &Value, flags: ChangeFlags) {
        self.subscribers.notify(new, old, flags);
    }
}

impl BatchFlush for BindableObserver {
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

impl Subscribable for BindableObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        if let Err(err) = self.start() {
            trace!(key = %self.key, %err, "subscribing to detached bindable");
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

impl PropertyObserver for BindableObserver {
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
            .ok_or_else(|| ObserveError::missing("set value", "component"))?;
        target.set_with_flags(&self.key, value, flags);
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Bindable
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::PlainObject
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}
