#![forbid(unsafe_code)]

//! Observable collections.
//!
//! Three shared collection handles, each with native operations that keep
//! their usual return values:
//!
//! - [`Sequence`]: ordered, index-addressed (`Vec<Value>` inside).
//! - [`Mapping`]: unique keys in insertion order.
//! - [`ValueSet`]: unique values in insertion order.
//!
//! When [`instrument`](crate::instrument) is installed and a collection
//! observer exists for an instance, every mutating operation also records
//! its structural delta in the observer's [`IndexMap`](crate::IndexMap) and
//! calls `notify()`. Otherwise the operations are plain.

pub mod mapping;
pub mod sequence;
pub mod set;

pub use mapping::{Mapping, WeakMapping};
pub use sequence::{Sequence, WeakSequence};
pub use set::{ValueSet, WeakValueSet};

use crate::value::{TargetId, TargetKind};

/// Any observable collection.
#[derive(Clone, Debug)]
pub enum Collection {
    Sequence(Sequence),
    Mapping(Mapping),
    Set(ValueSet),
}

impl Collection {
    #[must_use]
    pub fn id(&self) -> TargetId {
        match self {
            Self::Sequence(s) => s.id(),
            Self::Mapping(m) => m.id(),
            Self::Set(s) => s.id(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Sequence(s) => s.len(),
            Self::Mapping(m) => m.len(),
            Self::Set(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Sequence(_) => TargetKind::Sequence,
            Self::Mapping(_) => TargetKind::UniqueKeyMapping,
            Self::Set(_) => TargetKind::UniqueValueSet,
        }
    }

    /// Name of the derived size property (`length` or `size`).
    #[must_use]
    pub fn size_key(&self) -> &'static str {
        match self {
            Self::Sequence(_) => "length",
            Self::Mapping(_) | Self::Set(_) => "size",
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakCollection {
        match self {
            Self::Sequence(s) => WeakCollection::Sequence(s.downgrade()),
            Self::Mapping(m) => WeakCollection::Mapping(m.downgrade()),
            Self::Set(s) => WeakCollection::Set(s.downgrade()),
        }
    }
}

impl From<Sequence> for Collection {
    fn from(s: Sequence) -> Self {
        Self::Sequence(s)
    }
}

impl From<&Sequence> for Collection {
    fn from(s: &Sequence) -> Self {
        Self::Sequence(s.clone())
    }
}

impl From<Mapping> for Collection {
    fn from(m: Mapping) -> Self {
        Self::Mapping(m)
    }
}

impl From<&Mapping> for Collection {
    fn from(m: &Mapping) -> Self {
        Self::Mapping(m.clone())
    }
}

impl From<ValueSet> for Collection {
    fn from(s: ValueSet) -> Self {
        Self::Set(s)
    }
}

impl From<&ValueSet> for Collection {
    fn from(s: &ValueSet) -> Self {
        Self::Set(s.clone())
    }
}

/// Non-owning handle to a [`Collection`].
#[derive(Clone, Debug)]
pub enum WeakCollection {
    Sequence(WeakSequence),
    Mapping(WeakMapping),
    Set(WeakValueSet),
}

impl WeakCollection {
    #[must_use]
    pub fn upgrade(&self) -> Option<Collection> {
        match self {
            Self::Sequence(s) => s.upgrade().map(Collection::Sequence),
            Self::Mapping(m) => m.upgrade().map(Collection::Mapping),
            Self::Set(s) => s.upgrade().map(Collection::Set),
        }
    }
}
