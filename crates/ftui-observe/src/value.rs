#![forbid(unsafe_code)]

//! Dynamic values and observable plain objects.
//!
//! # Design
//!
//! [`Value`] is the tagged union every observer reads and writes. Reference
//! variants ([`Object`], [`Sequence`], [`Mapping`], [`ValueSet`]) are shared
//! handles (`Rc` inside); cloning a handle never copies the target.
//!
//! Equality follows SameValueZero: numbers compare by value with `NaN`
//! equal to itself, reference variants compare by identity. That makes
//! `Value` usable as a mapping key or set member and gives observers the
//! identity comparison they need to skip no-op writes.
//!
//! An [`Object`] keeps an insertion-ordered slot table. [`Object::get`] and
//! [`Object::set`] are the *native* read and assignment paths. Once a setter
//! or bindable observer starts observing a slot, the slot is intercepted and
//! assignments made through `set` are routed to that observer.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use ahash::RandomState;
use indexmap::IndexMap as OrderedMap;

use crate::collections::{Collection, Mapping, Sequence, ValueSet, WeakCollection};
use crate::flags::ChangeFlags;
use crate::observer::PropertyObserver;
use crate::observer::bindable::BindableDefinition;
use crate::tracking::DependencyRecorder;

// ─── Property keys ───────────────────────────────────────────────────────────

/// A property name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    Index(usize),
    Name(Rc<str>),
}

impl PropertyKey {
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(_) => None,
        }
    }

    #[must_use]
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Self::Name(n) if &**n == name)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Canonical decimal index: no sign, no leading zeros.
fn parse_index(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || (bytes.len() > 1 && bytes[0] == b'0') {
        return None;
    }
    if !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    name.parse().ok()
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        parse_index(name).map_or_else(|| Self::Name(Rc::from(name)), Self::Index)
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&PropertyKey> for PropertyKey {
    fn from(key: &PropertyKey) -> Self {
        key.clone()
    }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Identity of a reference target, stable while the target is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    pub(crate) fn of<T>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc) as *const () as usize)
    }
}

/// Classification of an observation target, resolved once per observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Sequence,
    UniqueKeyMapping,
    UniqueValueSet,
    PlainObject,
    Primitive,
}

impl TargetKind {
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::PlainObject,
            Value::Sequence(_) => Self::Sequence,
            Value::Mapping(_) => Self::UniqueKeyMapping,
            Value::Set(_) => Self::UniqueValueSet,
            _ => Self::Primitive,
        }
    }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Object),
    Sequence(Sequence),
    Mapping(Mapping),
    Set(ValueSet),
}

impl Value {
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// The collection behind this value, if it is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<Collection> {
        match self {
            Self::Sequence(s) => Some(Collection::Sequence(s.clone())),
            Self::Mapping(m) => Some(Collection::Mapping(m.clone())),
            Self::Set(s) => Some(Collection::Set(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        TargetKind::of(self)
    }

    /// Identity of the referenced target; `None` for primitives.
    #[must_use]
    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            Self::Object(o) => Some(o.id()),
            Self::Sequence(s) => Some(s.id()),
            Self::Mapping(m) => Some(m.id()),
            Self::Set(s) => Some(s.id()),
            _ => None,
        }
    }

    /// Non-owning handle to the referenced target; `None` for primitives.
    #[must_use]
    pub(crate) fn downgrade(&self) -> Option<WeakTarget> {
        match self {
            Self::Object(o) => Some(WeakTarget::Object(o.downgrade())),
            other => other
                .as_collection()
                .map(|c| WeakTarget::Collection(c.downgrade())),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::Set(_) => "set",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.id() == b.id(),
            (Self::Sequence(a), Self::Sequence(b)) => a.id() == b.id(),
            (Self::Mapping(a), Self::Mapping(b)) => a.id() == b.id(),
            (Self::Set(a), Self::Set(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                // +0 and -0 are equal, and every NaN is equal.
                let bits = if *n == 0.0 {
                    0u64
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Self::Str(s) => s.hash(state),
            other => other.target_id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(o) => o.fmt(f),
            Self::Sequence(s) => s.fmt(f),
            Self::Mapping(m) => m.fmt(f),
            Self::Set(s) => s.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Sequence> for Value {
    fn from(s: Sequence) -> Self {
        Self::Sequence(s)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Self::Mapping(m)
    }
}

impl From<ValueSet> for Value {
    fn from(s: ValueSet) -> Self {
        Self::Set(s)
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        match c {
            Collection::Sequence(s) => Self::Sequence(s),
            Collection::Mapping(m) => Self::Mapping(m),
            Collection::Set(s) => Self::Set(s),
        }
    }
}

/// Read `key` from any value without observing it.
///
/// Objects use their native read path; sequences answer `length` and
/// indices; mappings and sets answer `size`; strings answer `length` as a
/// character count. Everything else reads as `Undefined`.
#[must_use]
pub fn read_property(target: &Value, key: &PropertyKey) -> Value {
    match target {
        Value::Object(o) => o.get(key),
        Value::Sequence(s) => match key {
            PropertyKey::Index(index) => s.get(*index),
            key if key.is_name("length") => Value::from(s.len()),
            _ => Value::Undefined,
        },
        Value::Mapping(m) if key.is_name("size") => Value::from(m.len()),
        Value::Set(s) if key.is_name("size") => Value::from(s.len()),
        Value::Str(s) if key.is_name("length") => Value::from(s.chars().count()),
        _ => Value::Undefined,
    }
}

// ─── Weak targets ────────────────────────────────────────────────────────────

/// Non-owning reference used by side tables to detect dead targets.
#[derive(Clone)]
pub(crate) enum WeakTarget {
    Object(WeakObject),
    Collection(WeakCollection),
}

impl WeakTarget {
    pub(crate) fn is_alive(&self) -> bool {
        match self {
            Self::Object(o) => o.upgrade().is_some(),
            Self::Collection(c) => c.upgrade().is_some(),
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Object(o) => o.upgrade().map(Value::Object),
            Self::Collection(c) => c.upgrade().map(Value::from),
        }
    }
}

// ─── Accessors ───────────────────────────────────────────────────────────────

/// Getter body. Reads that should become dependencies go through the
/// recorder; the getter must not mutate observed state.
pub type Getter = Rc<dyn Fn(&Object, &DependencyRecorder) -> Value>;

/// Setter body.
pub type Setter = Rc<dyn Fn(&Object, Value)>;

/// A getter/setter pair installed on an object slot.
#[derive(Clone, Default)]
pub struct Accessor {
    pub(crate) get: Option<Getter>,
    pub(crate) set: Option<Setter>,
    pub(crate) pure: bool,
}

impl Accessor {
    /// Accessor with a getter and no setter.
    #[must_use]
    pub fn getter(get: impl Fn(&Object, &DependencyRecorder) -> Value + 'static) -> Self {
        Self {
            get: Some(Rc::new(get)),
            set: None,
            pure: false,
        }
    }

    /// Accessor with a setter and no getter. Such a property is unobservable.
    #[must_use]
    pub fn setter_only(set: impl Fn(&Object, Value) + 'static) -> Self {
        Self {
            get: None,
            set: Some(Rc::new(set)),
            pure: false,
        }
    }

    #[must_use]
    pub fn with_setter(mut self, set: impl Fn(&Object, Value) + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// Mark the getter as a pure read of a cache maintained by the setter.
    ///
    /// Pure accessors are observed without dependency tracking.
    #[must_use]
    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    #[must_use]
    pub fn has_getter(&self) -> bool {
        self.get.is_some()
    }

    #[must_use]
    pub fn has_setter(&self) -> bool {
        self.set.is_some()
    }

    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.pure
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .field("pure", &self.pure)
            .finish()
    }
}

// ─── Object ──────────────────────────────────────────────────────────────────

/// Observer that has taken over a data slot.
pub(crate) trait SlotInterceptor {
    fn current(&self) -> Value;
    fn assign(&self, value: Value, flags: ChangeFlags);
}

pub(crate) enum Slot {
    Data { value: Value, configurable: bool },
    Accessor(Accessor),
    Bindable {
        definition: BindableDefinition,
        value: Value,
    },
    Intercepted {
        interceptor: Rc<dyn SlotInterceptor>,
        owner: Rc<dyn PropertyObserver>,
    },
}

/// Shape of a slot as seen by the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotShape {
    Data { configurable: bool },
    Accessor { get: bool, set: bool, pure: bool },
    Bindable,
    Intercepted,
}

pub(crate) struct ObjectInner {
    slots: RefCell<OrderedMap<PropertyKey, Slot, RandomState>>,
    host_tag: Option<Rc<str>>,
}

/// Shared handle to a plain object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tag(None)
    }

    /// A host-environment node. The locator offers such targets to its
    /// node-observation strategy before classifying their slots.
    #[must_use]
    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self::with_tag(Some(tag.into()))
    }

    fn with_tag(host_tag: Option<Rc<str>>) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                slots: RefCell::new(OrderedMap::with_hasher(RandomState::new())),
                host_tag,
            }),
        }
    }

    /// Object with configurable data slots, in iteration order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<PropertyKey>,
        V: Into<Value>,
    {
        let object = Self::new();
        for (key, value) in pairs {
            object.define_data(key, value);
        }
        object
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        TargetId::of(&self.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        self.inner.host_tag.is_some()
    }

    #[must_use]
    pub fn host_tag(&self) -> Option<&str> {
        self.inner.host_tag.as_deref()
    }

    #[must_use]
    pub fn has(&self, key: impl Into<PropertyKey>) -> bool {
        self.inner.slots.borrow().contains_key(&key.into())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    // ── Definitions ──────────────────────────────────────────────────

    /// Define (or redefine) a configurable data slot.
    pub fn define_data(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.define(
            key.into(),
            Slot::Data {
                value: value.into(),
                configurable: true,
            },
        );
    }

    /// Define a data slot that can never be converted into an accessor.
    pub fn define_fixed(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.define(
            key.into(),
            Slot::Data {
                value: value.into(),
                configurable: false,
            },
        );
    }

    pub fn define_accessor(&self, key: impl Into<PropertyKey>, accessor: Accessor) {
        self.define(key.into(), Slot::Accessor(accessor));
    }

    /// Declare a component bindable with its change hooks.
    pub fn define_bindable(
        &self,
        key: impl Into<PropertyKey>,
        definition: BindableDefinition,
        initial: impl Into<Value>,
    ) {
        self.define(
            key.into(),
            Slot::Bindable {
                definition,
                value: initial.into(),
            },
        );
    }

    fn define(&self, key: PropertyKey, slot: Slot) {
        self.inner.slots.borrow_mut().insert(key, slot);
    }

    // ── Native read / assignment ─────────────────────────────────────

    /// Read a property. Accessor getters run untracked.
    #[must_use]
    pub fn get(&self, key: impl Into<PropertyKey>) -> Value {
        enum Read {
            Done(Value),
            Getter(Getter),
            Intercepted(Rc<dyn SlotInterceptor>),
        }
        let key = key.into();
        let read = match self.inner.slots.borrow().get(&key) {
            None => Read::Done(Value::Undefined),
            Some(Slot::Data { value, .. } | Slot::Bindable { value, .. }) => {
                Read::Done(value.clone())
            }
            Some(Slot::Accessor(accessor)) => match &accessor.get {
                Some(get) => Read::Getter(Rc::clone(get)),
                None => Read::Done(Value::Undefined),
            },
            Some(Slot::Intercepted { interceptor, .. }) => Read::Intercepted(Rc::clone(interceptor)),
        };
        match read {
            Read::Done(value) => value,
            Read::Getter(get) => get(self, &DependencyRecorder::untracked()),
            Read::Intercepted(interceptor) => interceptor.current(),
        }
    }

    /// Assign a property. Intercepted slots route the write to their
    /// observer; missing keys become configurable data slots; accessors
    /// without a setter ignore the write.
    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.set_with_flags(key, value, ChangeFlags::empty());
    }

    pub fn set_with_flags(
        &self,
        key: impl Into<PropertyKey>,
        value: impl Into<Value>,
        flags: ChangeFlags,
    ) {
        enum Write {
            Done,
            Setter(Setter, Value),
            Intercepted(Rc<dyn SlotInterceptor>, Value),
        }
        let key = key.into();
        let mut value = value.into();
        let write = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(&key) {
                None => {
                    slots.insert(
                        key,
                        Slot::Data {
                            value,
                            configurable: true,
                        },
                    );
                    return;
                }
                Some(Slot::Data { value: slot, .. }) => {
                    *slot = value;
                    Write::Done
                }
                Some(Slot::Bindable {
                    definition,
                    value: slot,
                }) => {
                    if let Some(coerce) = &definition.coerce {
                        value = coerce(value);
                    }
                    *slot = value;
                    Write::Done
                }
                Some(Slot::Accessor(accessor)) => match &accessor.set {
                    Some(set) => Write::Setter(Rc::clone(set), value),
                    None => Write::Done,
                },
                Some(Slot::Intercepted { interceptor, .. }) => {
                    Write::Intercepted(Rc::clone(interceptor), value)
                }
            }
        };
        match write {
            Write::Done => {}
            Write::Setter(set, value) => set(self, value),
            Write::Intercepted(interceptor, value) => interceptor.assign(value, flags),
        }
    }

    // ── Crate-internal slot access ───────────────────────────────────

    pub(crate) fn slot_shape(&self, key: &PropertyKey) -> Option<SlotShape> {
        self.inner.slots.borrow().get(key).map(|slot| match slot {
            Slot::Data { configurable, .. } => SlotShape::Data {
                configurable: *configurable,
            },
            Slot::Accessor(a) => SlotShape::Accessor {
                get: a.get.is_some(),
                set: a.set.is_some(),
                pure: a.pure,
            },
            Slot::Bindable { .. } => SlotShape::Bindable,
            Slot::Intercepted { .. } => SlotShape::Intercepted,
        })
    }

    pub(crate) fn accessor(&self, key: &PropertyKey) -> Option<Accessor> {
        match self.inner.slots.borrow().get(key) {
            Some(Slot::Accessor(accessor)) => Some(accessor.clone()),
            _ => None,
        }
    }

    pub(crate) fn bindable_definition(&self, key: &PropertyKey) -> Option<BindableDefinition> {
        match self.inner.slots.borrow().get(key) {
            Some(Slot::Bindable { definition, .. }) => Some(definition.clone()),
            _ => None,
        }
    }

    /// Hand the slot over to `interceptor`, returning the value it held.
    ///
    /// A slot already taken over stays with its owner, which is returned as
    /// the error.
    pub(crate) fn intercept(
        &self,
        key: &PropertyKey,
        interceptor: Rc<dyn SlotInterceptor>,
        owner: Rc<dyn PropertyObserver>,
    ) -> std::result::Result<Value, Rc<dyn PropertyObserver>> {
        let mut slots = self.inner.slots.borrow_mut();
        if let Some(Slot::Intercepted { owner: existing, .. }) = slots.get(key) {
            return Err(Rc::clone(existing));
        }
        let previous = slots.insert(key.clone(), Slot::Intercepted { interceptor, owner });
        Ok(match previous {
            Some(Slot::Data { value, .. } | Slot::Bindable { value, .. }) => value,
            _ => Value::Undefined,
        })
    }

    /// The observer that has taken over `key`, if any.
    pub(crate) fn slot_owner(&self, key: &PropertyKey) -> Option<Rc<dyn PropertyObserver>> {
        match self.inner.slots.borrow().get(key) {
            Some(Slot::Intercepted { owner, .. }) => Some(Rc::clone(owner)),
            _ => None,
        }
    }

    /// Replace an intercepted slot with a plain one again.
    pub(crate) fn release(&self, key: &PropertyKey, value: Value, definition: Option<BindableDefinition>) {
        let slot = match definition {
            Some(definition) => Slot::Bindable { definition, value },
            None => Slot::Data {
                value,
                configurable: true,
            },
        };
        self.inner.slots.borrow_mut().insert(key.clone(), slot);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Object");
        s.field("id", &self.id().0);
        if let Some(tag) = self.host_tag() {
            s.field("host", &tag);
        }
        s.field("slots", &self.inner.slots.borrow().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::hash::BuildHasher;

    #[test]
    fn numeric_strings_become_indices() {
        assert_eq!(PropertyKey::from("3"), PropertyKey::Index(3));
        assert_eq!(PropertyKey::from("03"), PropertyKey::Name(Rc::from("03")));
        assert_eq!(PropertyKey::from("-1"), PropertyKey::Name(Rc::from("-1")));
        assert!(PropertyKey::from("length").is_name("length"));
    }

    #[test]
    fn same_value_zero_equality() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_ne!(Value::from(1), Value::from("1"));
        let a = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(Object::new()), Value::from(Object::new()));
    }

    #[test]
    fn equal_values_hash_equal() {
        let state = RandomState::new();
        assert_eq!(
            state.hash_one(Value::from(0.0)),
            state.hash_one(Value::from(-0.0))
        );
        assert_eq!(
            state.hash_one(Value::from(f64::NAN)),
            state.hash_one(Value::from(-f64::NAN))
        );
    }

    #[test]
    fn data_slots_read_and_write() {
        let o = Object::from_pairs([("x", 1)]);
        assert_eq!(o.get("x"), Value::from(1));
        o.set("x", 2);
        assert_eq!(o.get("x"), Value::from(2));
        o.set("y", "new");
        assert_eq!(o.get("y"), Value::from("new"));
        assert!(o.get("missing").is_undefined());
        assert_eq!(o.keys().len(), 2);
    }

    #[test]
    fn accessor_runs_getter_and_setter() {
        let o = Object::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
        o.define_accessor(
            "full",
            Accessor::getter(|this, deps| {
                let first = deps.get(this, "first");
                let last = deps.get(this, "last");
                Value::from(format!(
                    "{} {}",
                    first.as_str().unwrap_or_default(),
                    last.as_str().unwrap_or_default()
                ))
            })
            .with_setter(|this, v| this.set("first", v)),
        );
        assert_eq!(o.get("full"), Value::from("Ada Lovelace"));
        o.set("full", "Grace");
        assert_eq!(o.get("first"), Value::from("Grace"));
    }

    #[test]
    fn setter_only_accessor_reads_undefined() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let o = Object::new();
        o.define_accessor("sink", Accessor::setter_only(move |_, _| h.set(h.get() + 1)));
        o.set("sink", 1);
        assert_eq!(hits.get(), 1);
        assert!(o.get("sink").is_undefined());
    }

    #[test]
    fn read_property_covers_primitives_and_collections() {
        let seq = Sequence::from_values([Value::from(1), Value::from(2)]);
        assert_eq!(
            read_property(&Value::from(seq.clone()), &PropertyKey::from("length")),
            Value::from(2)
        );
        assert_eq!(
            read_property(&Value::from(seq), &PropertyKey::Index(1)),
            Value::from(2)
        );
        assert_eq!(
            read_property(&Value::from("héllo"), &PropertyKey::from("length")),
            Value::from(5)
        );
        assert!(read_property(&Value::from(4), &PropertyKey::from("length")).is_undefined());
    }

    #[test]
    fn host_objects_carry_a_tag() {
        let node = Object::host("input");
        assert!(node.is_host());
        assert_eq!(node.host_tag(), Some("input"));
        assert!(!Object::new().is_host());
    }
}
