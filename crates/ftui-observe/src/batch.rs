#![forbid(unsafe_code)]

//! Batched notification scopes.
//!
//! While a batch is open, observers still apply every write immediately but
//! queue themselves (once each) instead of notifying. When the outermost
//! scope closes, the queue is flushed: each queued observer delivers one
//! notification describing the net effect of everything that happened to it
//! inside the batch.
//!
//! # Nesting
//!
//! Scopes nest arbitrarily; only the outermost [`end`] flushes. During the
//! flush the batch stays open, so writes made by subscribers are queued and
//! delivered in a further round. The flush loops until a round queues
//! nothing new.
//!
//! # Usage
//!
//! ```
//! use ftui_observe::batch::{self, BatchScope};
//!
//! {
//!     let _scope = BatchScope::new();
//!     assert!(batch::is_batching());
//!     // ... several writes, one notification each at scope exit ...
//! }
//! assert!(!batch::is_batching());
//!
//! let total = batch::batch(|| 1 + 2);
//! assert_eq!(total, 3);
//! ```
//!
//! # Failure Modes
//!
//! - **Panic inside a batch**: the scope unwinds without flushing; queued
//!   observers drop their pending notification.
//! - **Panic inside a subscriber during flush**: the batch is closed and the
//!   rest of the queue is discarded before the panic continues.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

/// Observer side of a batch: deliver (or drop) the deferred notification.
pub(crate) trait BatchFlush {
    fn flush_batch(&self);
    fn discard_batch(&self);
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queue: Vec<Rc<dyn BatchFlush>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Current nesting depth (0 when no batch is open).
#[must_use]
pub fn depth() -> usize {
    BATCH.with(|b| b.borrow().depth)
}

#[must_use]
pub fn is_batching() -> bool {
    depth() > 0
}

/// Queue `item` for the end of the current batch.
///
/// Callers dedupe themselves; the queue does not.
pub(crate) fn enqueue(item: Rc<dyn BatchFlush>) {
    BATCH.with(|b| b.borrow_mut().queue.push(item));
}

/// Open a batch. Must be paired with [`end`]; prefer [`BatchScope`].
pub fn begin() {
    BATCH.with(|b| b.borrow_mut().depth += 1);
}

/// Close a batch, flushing if it was the outermost one.
pub fn end() {
    let outermost = BATCH.with(|b| {
        let mut state = b.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        state.depth == 0
    });
    if outermost {
        flush();
    }
}

/// Run `f` inside a batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

fn take_queue() -> Vec<Rc<dyn BatchFlush>> {
    BATCH.with(|b| std::mem::take(&mut b.borrow_mut().queue))
}

/// Closes the flush batch even if a subscriber panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let leftover = BATCH.with(|b| {
            let mut state = b.borrow_mut();
            state.depth = 0;
            std::mem::take(&mut state.queue)
        });
        for item in leftover {
            item.discard_batch();
        }
    }
}

fn flush() {
    BATCH.with(|b| b.borrow_mut().depth = 1);
    let _guard = FlushGuard;
    let mut round = 0usize;
    loop {
        let queue = take_queue();
        if queue.is_empty() {
            break;
        }
        round += 1;
        trace!(round, queued = queue.len(), "flushing batch");
        for item in queue {
            item.flush_batch();
        }
    }
}

/// RAII batch scope. Notifications are deferred until the outermost scope
/// is dropped.
#[must_use = "the batch closes as soon as the scope is dropped"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    pub fn new() -> Self {
        begin();
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let leftover = BATCH.with(|b| {
                let mut state = b.borrow_mut();
                state.depth = state.depth.saturating_sub(1);
                if state.depth == 0 {
                    std::mem::take(&mut state.queue)
                } else {
                    Vec::new()
                }
            });
            for item in leftover {
                item.discard_batch();
            }
            return;
        }
        end();
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        flushed: Cell<u32>,
        discarded: Cell<u32>,
    }

    impl Probe {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                flushed: Cell::new(0),
                discarded: Cell::new(0),
            })
        }
    }

    impl BatchFlush for Probe {
        fn flush_batch(&self) {
            self.flushed.set(self.flushed.get() + 1);
        }
        fn discard_batch(&self) {
            self.discarded.set(self.discarded.get() + 1);
        }
    }

    #[test]
    fn nested_scopes_flush_once_at_outermost() {
        let probe = Probe::new();
        {
            let _outer = BatchScope::new();
            {
                let _inner = BatchScope::new();
                assert_eq!(depth(), 2);
                enqueue(probe.clone());
            }
            assert_eq!(probe.flushed.get(), 0);
            assert_eq!(depth(), 1);
        }
        assert_eq!(probe.flushed.get(), 1);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn flush_loops_over_newly_queued_work() {
        struct Requeue {
            again: Rc<Probe>,
            rounds_seen: Cell<usize>,
        }
        impl BatchFlush for Requeue {
            fn flush_batch(&self) {
                // Still inside the flush batch: this lands in the next round.
                self.rounds_seen.set(depth());
                enqueue(self.again.clone());
            }
            fn discard_batch(&self) {}
        }

        let probe = Probe::new();
        let requeue = Rc::new(Requeue {
            again: probe.clone(),
            rounds_seen: Cell::new(0),
        });
        batch(|| enqueue(requeue.clone()));
        assert_eq!(requeue.rounds_seen.get(), 1);
        assert_eq!(probe.flushed.get(), 1);
        assert!(!is_batching());
    }

    #[test]
    fn begin_end_pair() {
        begin();
        assert!(is_batching());
        end();
        assert!(!is_batching());
        // Unbalanced end does not underflow.
        end();
        assert_eq!(depth(), 0);
    }

    #[test]
    fn panic_in_batch_discards_queue() {
        let probe = Probe::new();
        let p = probe.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch(|| {
                enqueue(p.clone());
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert_eq!(probe.flushed.get(), 0);
        assert_eq!(probe.discarded.get(), 1);
        assert!(!is_batching());
    }
}
