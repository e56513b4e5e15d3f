//! Dependency Context
//!
//! The dependency context records which channels a computation read during
//! its most recent run. When a signal is read, it asks the runtime's
//! [`ContextSlot`] for the active context and, if there is one, subscribes
//! the running computation to its channel.
//!
//! # Implementation
//!
//! Each runtime owns exactly one slot holding the active context (or none).
//! Entering a computation saves the previous value and installs the
//! computation's own context; the returned [`ContextGuard`] restores the
//! previous value when dropped. Nested runs therefore form an implicit stack,
//! and the slot is restored even if the computation panics.
//!
//! [`ContextSlot::untracked`] installs "no context" for the duration of a
//! closure, which is how `untrack` suspends dependency recording.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::observable::{ChannelId, Observable, Subscription};
use super::subscriber::Observer;

/// Dependencies of one computation.
///
/// Reused across runs: it is cleared, not recreated, before every run so
/// dependencies that were not read again get unsubscribed.
pub struct DependencyContext {
    /// Channel read -> subscription obtained by that read.
    dependencies: RefCell<IndexMap<ChannelId, Subscription>>,
    /// Entry point of the owning computation.
    observer: Weak<dyn Observer>,
}

impl DependencyContext {
    /// Create an empty context owned by the given observer.
    pub fn new(observer: Weak<dyn Observer>) -> Rc<Self> {
        Rc::new(Self {
            dependencies: RefCell::new(IndexMap::new()),
            observer,
        })
    }

    /// Record a read of `channel`.
    ///
    /// Re-recording the same channel replaces the earlier handle.
    pub fn record(&self, channel: &Observable) {
        let Some(observer) = self.observer.upgrade() else {
            return;
        };
        let subscription = channel.subscribe(observer);
        self.dependencies
            .borrow_mut()
            .insert(channel.id(), subscription);
    }

    /// Unsubscribe from every recorded channel and forget them.
    pub fn clear(&self) {
        let dependencies: Vec<Subscription> = self
            .dependencies
            .borrow_mut()
            .drain(..)
            .map(|(_, subscription)| subscription)
            .collect();

        for subscription in dependencies {
            subscription.unsubscribe();
        }
    }

    /// Number of channels recorded in the current run.
    pub fn len(&self) -> usize {
        self.dependencies.borrow().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.dependencies.borrow().is_empty()
    }

    /// Whether `channel` was read in the current run.
    pub fn depends_on(&self, channel: ChannelId) -> bool {
        self.dependencies.borrow().contains_key(&channel)
    }
}

/// Holder of the active dependency context.
#[derive(Default)]
pub struct ContextSlot {
    current: RefCell<Option<Rc<DependencyContext>>>,
}

impl ContextSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `context` until the returned guard is dropped.
    pub fn enter(&self, context: Option<Rc<DependencyContext>>) -> ContextGuard<'_> {
        let previous = self.current.replace(context);
        ContextGuard {
            slot: self,
            previous,
        }
    }

    /// The active context, if any.
    pub fn current(&self) -> Option<Rc<DependencyContext>> {
        self.current.borrow().clone()
    }

    /// Check if a computation is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Record a read of `channel` in the active context.
    pub fn track(&self, channel: &Observable) {
        if let Some(context) = self.current() {
            context.record(channel);
        }
    }

    /// Run `f` with dependency recording suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(None);
        f()
    }
}

/// Guard that restores the previous context when dropped.
pub struct ContextGuard<'a> {
    slot: &'a ContextSlot,
    previous: Option<Rc<DependencyContext>>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        *self.slot.current.borrow_mut() = self.previous.take();
    }
}
