#![forbid(unsafe_code)]

//! Observation engine: property observers, collection diffs, batching.
//!
//! Views bind to state through observers. This crate provides:
//!
//! - [`ObserverLocator`]: picks and caches the observer for a `(target, key)`
//!   pair.
//! - [`observer`]: the observer strategies (intercepted data slots,
//!   bindables, computed accessors, collection-derived properties, polling).
//! - [`collections`]: [`Sequence`], [`Mapping`] and [`ValueSet`], whose
//!   mutating operations report structural diffs as [`IndexMap`]s once
//!   [`instrument`]ation is installed.
//! - [`batch`]: scopes that coalesce bursts of writes into one notification
//!   per observer.
//! - [`reconcile`]: minimal-move reordering of a projection from an
//!   [`IndexMap`].
//!
//! # Architecture
//!
//! The model is single-threaded: shared state is `Rc<RefCell<..>>`, and
//! process-wide registries (instrumentation, batch queue) are thread-locals.
//! Observers hold their targets weakly; side tables hold targets weakly and
//! prune dead entries.
//!
//! # Invariants
//!
//! 1. One observer per `(target, key)` per locator while the target lives.
//! 2. One collection observer per collection instance.
//! 3. No subscriber is registered twice on the same observer.
//! 4. Writing an equal value never notifies.
//! 5. Inside a batch, each observer notifies at most once per flush round,
//!    with the net effect.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ftui_observe::{Object, ObserverConfig, ObserverLocator, Subscribable, Value, subscriber};
//!
//! let locator = ObserverLocator::new(ObserverConfig::default());
//! let model = Object::from_pairs([("count", 0)]);
//! let observer = locator.get_observer(&Value::from(model.clone()), "count").unwrap();
//!
//! let seen = Rc::new(Cell::new(0));
//! let s = Rc::clone(&seen);
//! observer.subscribe(subscriber::from_fn(move |_, _, _| s.set(s.get() + 1)));
//!
//! model.set("count", 1);
//! assert_eq!(seen.get(), 1);
//! ```

pub mod batch;
pub mod collections;
pub mod config;
pub mod error;
pub mod flags;
pub mod index_map;
pub mod instrument;
pub mod locator;
pub mod observer;
pub mod reconcile;
pub mod subscriber;
pub mod tracking;
pub mod value;

pub use batch::BatchScope;
pub use collections::{Collection, Mapping, Sequence, ValueSet};
pub use config::{DirtyCheckMode, DirtyCheckSettings, ObserverConfig};
pub use error::{ObserveError, Result, UnobservableReason};
pub use flags::ChangeFlags;
pub use index_map::{IndexEntry, IndexMap};
pub use locator::{NodeObserverStrategy, ObserverLocator};
pub use observer::{
    BindableDefinition, CollectionObserver, ObserverKind, PropertyAccessor, PropertyObserver,
};
pub use reconcile::{ReconcilePlan, Reconciler, longest_increasing_subsequence};
pub use subscriber::{Subscribable, Subscriber, SubscriberRecord, Subscription};
pub use tracking::{Dependency, DependencyRecorder};
pub use value::{Accessor, Object, PropertyKey, TargetId, TargetKind, Value};
