//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and a
//! notification channel.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computation is running, the signal
//!    records its channel in that computation's dependency context.
//!
//! 2. When a write is not equal to the current value (under the signal's
//!    equality predicate), the value is replaced and every subscriber is
//!    notified synchronously.
//!
//! 3. Writes that compare equal are dropped silently.
//!
//! Computed nodes cache their results in a `Signal<Outcome<T>>`; reading such
//! a signal hands back the cached error, which is how failures propagate to
//! every downstream reader.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::trace;

use super::context::ContextSlot;
use super::observable::{Observable, Subscription};
use super::options::{EqualsFn, Options};
use super::subscriber::Observer;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NotifyTarget, ReadHook, Trackable};

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equals: EqualsFn<T>,
    label: Option<String>,
    channel: Observable,
    context: Rc<ContextSlot>,
    on_read: ReadHook,
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.state(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    pub(crate) fn new(value: T, options: Options<T>, context: Rc<ContextSlot>) -> Self {
        let (equals, label) = options.into_parts();
        Self {
            inner: Rc::new(SignalInner {
                id: NodeId::new(),
                value: RefCell::new(value),
                equals,
                label,
                channel: Observable::new(),
                context,
                on_read: ReadHook::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the diagnostic label.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Get the current value.
    ///
    /// If called while a computation is running, the computation becomes a
    /// subscriber of this signal.
    pub fn get(&self) -> T {
        self.inner.on_read.fire();
        self.inner.context.track(&self.inner.channel);
        self.get_untracked()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Read the value by reference, recording a dependency.
    ///
    /// # Panics
    ///
    /// The value stays borrowed while `f` runs, so writing to this signal
    /// from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.on_read.fire();
        self.inner.context.track(&self.inner.channel);
        f(&*self.inner.value.borrow())
    }

    /// Inspect the value by reference without recording a dependency.
    pub(crate) fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Store `value` if it differs from the current one and notify.
    ///
    /// Returns the stored value, whether or not it changed.
    pub fn set(&self, value: T) -> T {
        self.write(value);
        self.get_untracked()
    }

    /// Update the value using a function of the current value.
    ///
    /// # Panics
    ///
    /// Like [`Signal::with`], `f` must not write to this signal.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&*self.inner.value.borrow());
        self.set(new_value)
    }

    /// Store `value` if it differs. Returns whether subscribers were notified.
    pub(crate) fn write(&self, value: T) -> bool {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equals)(&*current, &value) {
                false
            } else {
                *current = value;
                true
            }
        };

        if changed {
            trace!(node = %self.inner.id, label = ?self.inner.label, "signal changed");
            self.inner.channel.notify_all();
        }
        changed
    }

    /// Notify subscribers without touching the value.
    pub(crate) fn notify(&self) {
        self.inner.channel.notify_all();
    }

    /// Register an observer on this signal's channel.
    pub fn subscribe(&self, observer: Rc<dyn Observer>) -> Subscription {
        self.inner.channel.subscribe(observer)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.observer_count()
    }
}

impl<T: Clone + 'static> Trackable for Signal<T> {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        self.get();
        Ok(())
    }

    fn notify_target(&self) -> NotifyTarget<'_> {
        NotifyTarget::Channel(&self.inner.channel)
    }

    fn read_hook(&self) -> &ReadHook {
        &self.inner.on_read
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
