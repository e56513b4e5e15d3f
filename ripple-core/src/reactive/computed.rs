//! Computed Implementation
//!
//! A Computed node is a cached derived value that re-evaluates only when it
//! is read after one of its dependencies changed.
//!
//! # How Computed Nodes Work
//!
//! 1. Construction does nothing. The first `get()` runs the callback and
//!    seeds an internal cache signal with the outcome.
//!
//! 2. While the callback runs, the node's own dependency context is active,
//!    so every signal it reads subscribes the node's entry point.
//!
//! 3. When a dependency notifies, the node is marked dirty and forwards the
//!    notification through its cache channel. Nothing is recomputed.
//!
//! 4. The next `get()` on a dirty node unsubscribes every old dependency,
//!    runs the callback again and writes the outcome into the cache.
//!
//! # Errors
//!
//! An `Err` returned by the callback is cached exactly like a value. The
//! cache never considers two outcomes equal when either is an error, so
//! dependents hear about every failure. The error is handed back by every
//! read until a dependency changes and a fresh run replaces it.
//!
//! # Entry Point
//!
//! Dependencies do not subscribe the node directly but its [`NotifyPort`].
//! The port normally forwards to a marker that sets the dirty flag; a
//! watcher may decorate it to additionally record the node as pending.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::{ContextSlot, DependencyContext};
use super::options::Options;
use super::signal::Signal;
use super::subscriber::{NotifyPort, Observer, ObserverId};
use crate::error::{Outcome, ReactiveError};
use crate::graph::{NodeId, NotifyTarget, ReadHook, Trackable};

/// Lifecycle state of a computed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// Never read; the callback has not run.
    Uninitialized,

    /// The cached value is up to date.
    Clean,

    /// The cached result is an error, and still current.
    Errored,

    /// A dependency changed since the last run.
    Dirty,
}

struct ComputedInner<T: 'static> {
    id: NodeId,
    label: Option<String>,
    dirty: Cell<bool>,
    running: Cell<bool>,
    runs: Cell<u64>,
    callback: Box<dyn Fn() -> Outcome<T>>,
    cache_options: Options<Outcome<T>>,
    /// Created by the first read.
    cache: RefCell<Option<Signal<Outcome<T>>>>,
    dependencies: Rc<DependencyContext>,
    port: Rc<NotifyPort>,
    slot: Rc<ContextSlot>,
    on_read: ReadHook,
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn cache(&self) -> Option<Signal<Outcome<T>>> {
        self.cache.borrow().clone()
    }

    /// Handle a dependency notification.
    fn mark_dirty(&self) {
        self.dirty.set(true);
        if let Some(cache) = self.cache() {
            cache.notify();
        }
    }

    fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    fn run(&self) -> Outcome<T> {
        self.dirty.set(false);
        self.dependencies.clear();

        let outcome = {
            let _running = Evaluating::enter(&self.running);
            let _context = self.slot.enter(Some(Rc::clone(&self.dependencies)));
            (self.callback)()
        };

        self.runs.set(self.runs.get() + 1);
        match &outcome {
            Ok(_) => trace!(
                node = %self.id,
                label = ?self.label,
                dependencies = self.dependencies.len(),
                "recomputed"
            ),
            Err(error) => trace!(
                node = %self.id,
                label = ?self.label,
                %error,
                "recomputation failed"
            ),
        }
        outcome
    }
}

/// Clears the running flag even if the callback panics.
struct Evaluating<'a>(&'a Cell<bool>);

impl<'a> Evaluating<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Evaluating<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Default handler behind a computed node's entry point.
struct DirtyMarker<T: 'static> {
    id: ObserverId,
    node: Weak<ComputedInner<T>>,
}

impl<T: Clone + 'static> Observer for DirtyMarker<T> {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn next(&self) {
        if let Some(node) = self.node.upgrade() {
            node.mark_dirty();
        }
    }
}

/// A lazily evaluated, memoized derived value.
///
/// # Example
///
/// ```rust,ignore
/// let a = rt.state(0);
/// let a_clone = a.clone();
/// let doubled = rt.computed(move || a_clone.get() * 2);
///
/// a.set(3);
/// assert_eq!(doubled.get()?, 6);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new<F>(callback: F, options: Options<T>, slot: Rc<ContextSlot>) -> Self
    where
        F: Fn() -> Outcome<T> + 'static,
    {
        let (equals, label) = options.into_parts();
        let mut cache_options = Options::with_equals(move |a: &Outcome<T>, b: &Outcome<T>| {
            match (a, b) {
                (Ok(a), Ok(b)) => equals(a, b),
                _ => false,
            }
        });
        if let Some(label) = &label {
            cache_options = cache_options.debug(label.clone());
        }

        let inner = Rc::new_cyclic(|node: &Weak<ComputedInner<T>>| {
            let marker: Rc<dyn Observer> = Rc::new(DirtyMarker {
                id: ObserverId::new(),
                node: node.clone(),
            });
            let port = NotifyPort::new(marker);
            let port_dyn: Rc<dyn Observer> = port.clone();
            let entry = Rc::downgrade(&port_dyn);

            ComputedInner {
                id: NodeId::new(),
                label,
                dirty: Cell::new(true),
                running: Cell::new(false),
                runs: Cell::new(0),
                callback: Box::new(callback),
                cache_options,
                cache: RefCell::new(None),
                dependencies: DependencyContext::new(entry),
                port,
                slot,
                on_read: ReadHook::new(),
            }
        });

        Self { inner }
    }

    /// Get the node's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the diagnostic label.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Get the current value, recomputing at most once if stale.
    ///
    /// Inside a running computation, this records a dependency on the node,
    /// also when the cached result is an error.
    pub fn get(&self) -> Outcome<T> {
        let inner = &self.inner;
        inner.on_read.fire();
        if inner.running.get() {
            return Err(ReactiveError::Cycle {
                label: inner.display_label(),
            });
        }

        let cache = match inner.cache() {
            None => {
                let outcome = inner.run();
                let cache =
                    Signal::new(outcome, inner.cache_options.clone(), Rc::clone(&inner.slot));
                *inner.cache.borrow_mut() = Some(cache.clone());
                cache
            }
            Some(cache) => {
                if inner.dirty.get() {
                    let outcome = inner.run();
                    cache.write(outcome);
                }
                cache
            }
        };

        cache.get()
    }

    /// Mark the node dirty as if a dependency had notified.
    ///
    /// Goes through the entry point, so a watcher tracking this node sees it.
    pub fn invalidate(&self) {
        self.inner.port.next();
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> ComputedState {
        match self.inner.cache() {
            None => ComputedState::Uninitialized,
            Some(_) if self.inner.dirty.get() => ComputedState::Dirty,
            Some(cache) if cache.peek(Result::is_err) => ComputedState::Errored,
            Some(_) => ComputedState::Clean,
        }
    }

    /// Whether the next read will run the callback.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Check if the node has a cached result.
    pub fn has_value(&self) -> bool {
        self.inner.cache.borrow().is_some()
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Number of channels read during the most recent run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.len()
    }

    /// Number of observers of this node's cache.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .cache()
            .map(|cache| cache.subscriber_count())
            .unwrap_or(0)
    }

    /// Drop every dependency subscription.
    pub(crate) fn detach(&self) {
        self.inner.dependencies.clear();
    }
}

impl<T: Clone + 'static> Trackable for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        self.get().map(|_| ())
    }

    fn notify_target(&self) -> NotifyTarget<'_> {
        NotifyTarget::Port(&self.inner.port)
    }

    fn read_hook(&self) -> &ReadHook {
        &self.inner.on_read
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
