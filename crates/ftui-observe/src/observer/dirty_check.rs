#![forbid(unsafe_code)]

//! Polling fallback for properties that cannot be intercepted.
//!
//! A [`DirtyCheckProperty`] remembers the value it last reported. While it
//! has subscribers it sits in the [`DirtyChecker`]'s poll list; each
//! [`check`](DirtyChecker::check) compares the stored value with the live
//! one and notifies on difference.
//!
//! The host scheduler calls [`tick`](DirtyChecker::tick) once per rendered
//! frame; a check runs every `frames_per_check` ticks.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::config::{DirtyCheckMode, DirtyCheckSettings};
use crate::error::{ObserveError, Result, UnobservableReason};
use crate::flags::ChangeFlags;
use crate::observer::{ObserverKind, PropertyObserver};
use crate::subscriber::{Subscribable, Subscriber, SubscriberRecord};
use crate::value::{PropertyKey, TargetKind, Value, WeakTarget, read_property};

/// Shared poll list with a frame-throttled cadence.
pub struct DirtyChecker {
    settings: DirtyCheckSettings,
    tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
    frames: Cell<u32>,
    this: Weak<DirtyChecker>,
}

impl DirtyChecker {
    #[must_use]
    pub fn new(settings: DirtyCheckSettings) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            settings,
            tracked: RefCell::new(Vec::new()),
            frames: Cell::new(0),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &DirtyCheckSettings {
        &self.settings
    }

    /// Number of properties currently polled.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// Advance one frame; runs [`check`](Self::check) every
    /// `frames_per_check` frames.
    pub fn tick(&self) {
        let frames = self.frames.get() + 1;
        if frames >= self.settings.frames_per_check.max(1) {
            self.frames.set(0);
            self.check();
        } else {
            self.frames.set(frames);
        }
    }

    /// Poll every tracked property now.
    pub fn check(&self) {
        let tracked: Vec<Rc<DirtyCheckProperty>> = self.tracked.borrow().clone();
        if tracked.is_empty() {
            return;
        }
        trace!(count = tracked.len(), "dirty check");
        for property in tracked {
            if property.is_dirty() {
                property.flush(ChangeFlags::empty());
            }
        }
    }

    /// Create the polling observer for `key` of `target`, honoring the
    /// configured mode.
    ///
    /// # Errors
    ///
    /// - [`ObserveError::UnobservableProperty`] when dirty checking is
    ///   disabled.
    /// - [`ObserveError::DirtyCheckEngaged`] in [`DirtyCheckMode::Throw`].
    pub(crate) fn create_property(
        &self,
        target: &Value,
        key: PropertyKey,
    ) -> Result<Rc<DirtyCheckProperty>> {
        if self.settings.disabled {
            return Err(ObserveError::unobservable(
                &key,
                UnobservableReason::NonConfigurable,
            ));
        }
        match self.settings.mode {
            DirtyCheckMode::Throw => return Err(ObserveError::DirtyCheckEngaged { key }),
            DirtyCheckMode::Warn => warn!(
                target: "ftui_observe::dirty_check",
                key = %key,
                target_type = target.type_name(),
                "property is dirty-checked; consider making it observable"
            ),
            DirtyCheckMode::Silent => {}
        }
        let weak = target
            .downgrade()
            .ok_or_else(|| ObserveError::missing("dirty checking", "reference target"))?;
        Ok(Rc::new_cyclic(|this| DirtyCheckProperty {
            target: weak,
            key,
            old_value: RefCell::new(Value::Undefined),
            subscribers: SubscriberRecord::new(),
            checker: self.this.clone(),
            target_kind: target.kind(),
            this: this.clone(),
        }))
    }

    fn add(&self, property: Rc<DirtyCheckProperty>) {
        self.tracked.borrow_mut().push(property);
    }

    fn remove(&self, property: &DirtyCheckProperty) {
        self.tracked
            .borrow_mut()
            .retain(|p| !std::ptr::eq(Rc::as_ptr(p), property));
    }
}

/// Polling observer for one property.
pub struct DirtyCheckProperty {
    target: WeakTarget,
    key: PropertyKey,
    old_value: RefCell<Value>,
    subscribers: SubscriberRecord,
    checker: Weak<DirtyChecker>,
    target_kind: TargetKind,
    this: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    fn live(&self) -> Value {
        self.target
            .upgrade()
            .map(|target| read_property(&target, &self.key))
            .unwrap_or_default()
    }

    /// Whether the live value differs from the last reported one.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        *self.old_value.borrow() != self.live()
    }

    fn flush(&self, flags: ChangeFlags) {
        let new = self.live();
        let old = std::mem::replace(&mut *self.old_value.borrow_mut(), new.clone());
        self.subscribers.notify(&new, &old, flags);
    }
}

impl Subscribable for DirtyCheckProperty {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added && self.subscribers.count() == 1 {
            *self.old_value.borrow_mut() = self.live();
            if let (Some(checker), Some(this)) = (self.checker.upgrade(), self.this.upgrade()) {
                checker.add(this);
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed
            && !self.subscribers.any()
            && let Some(checker) = self.checker.upgrade()
        {
            checker.remove(self);
        }
        removed
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.live()
    }

    /// Writes go straight to the target; the next check reports them.
    fn set_value(&self, value: Value, flags: ChangeFlags) -> Result<()> {
        match self.target.upgrade() {
            Some(Value::Object(object)) => object.set_with_flags(&self.key, value, flags),
            Some(Value::Sequence(seq)) => {
                if let Some(index) = self.key.as_index() {
                    seq.set(index, value);
                }
            }
            Some(_) => {}
            None => return Err(ObserveError::missing("set value", "target")),
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::DirtyCheck
    }

    fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }
}
