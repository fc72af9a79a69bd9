#![forbid(unsafe_code)]

//! Error taxonomy for observer lookup and observer writes.
//!
//! All errors are synchronous. Nothing in this crate retries: an error
//! surfaces at the call that triggered the lookup or the write.

use thiserror::Error;

use crate::value::PropertyKey;

pub type Result<T> = std::result::Result<T, ObserveError>;

/// Why a property could not be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnobservableReason {
    /// The accessor defines a setter but no getter.
    SetterWithoutGetter,
    /// The slot cannot be converted and dirty checking is disabled.
    NonConfigurable,
}

impl std::fmt::Display for UnobservableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetterWithoutGetter => f.write_str("accessor has a setter but no getter"),
            Self::NonConfigurable => {
                f.write_str("property is non-configurable and dirty checking is disabled")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("property `{key}` cannot be observed: {reason}")]
    UnobservableProperty {
        key: PropertyKey,
        reason: UnobservableReason,
    },

    #[error("{operation} requires {context}, which is no longer available")]
    MissingAmbientContext {
        operation: &'static str,
        context: &'static str,
    },

    #[error("dirty checking engaged for property `{key}`")]
    DirtyCheckEngaged { key: PropertyKey },

    #[error("property `{key}` is read-only")]
    ReadOnlyProperty { key: PropertyKey },

    #[error("invalid collection length: {value}")]
    InvalidLength { value: String },
}

impl ObserveError {
    /// True for errors that mean "this property has no observer".
    ///
    /// A dirty-check engagement configured to throw counts as unobservable.
    #[must_use]
    pub fn is_unobservable(&self) -> bool {
        matches!(
            self,
            Self::UnobservableProperty { .. } | Self::DirtyCheckEngaged { .. }
        )
    }

    #[must_use]
    pub(crate) fn missing(operation: &'static str, context: &'static str) -> Self {
        Self::MissingAmbientContext { operation, context }
    }

    #[must_use]
    pub(crate) fn unobservable(key: &PropertyKey, reason: UnobservableReason) -> Self {
        Self::UnobservableProperty {
            key: key.clone(),
            reason,
        }
    }

    #[must_use]
    pub(crate) fn read_only(key: &PropertyKey) -> Self {
        Self::ReadOnlyProperty { key: key.clone() }
    }
}
