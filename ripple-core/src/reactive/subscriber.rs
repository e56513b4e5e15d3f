//! Observer types for the notification layer.
//!
//! An observer is anything that wants to hear about changes on a channel:
//! computed nodes, watcher hooks, or plain closures.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observer.
///
/// A channel keeps at most one subscription per observer id, so subscribing
/// the same observer twice replaces the earlier subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives change notifications from a channel.
pub trait Observer {
    /// Identity used by channels to deduplicate subscriptions.
    fn id(&self) -> ObserverId;

    /// Called once per notification.
    fn next(&self);
}

/// A closure-backed observer.
pub struct Subscriber {
    id: ObserverId,
    notify: Box<dyn Fn()>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    ///
    /// Channels hold observers weakly, so the caller keeps the returned `Rc`
    /// alive for as long as it wants to be notified.
    pub fn new<F>(notify: F) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        Rc::new(Self {
            id: ObserverId::new(),
            notify: Box::new(notify),
        })
    }
}

impl Observer for Subscriber {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn next(&self) {
        (self.notify)();
    }
}

/// A node's notification entry point.
///
/// Dependencies subscribe the port, never the node itself. The port forwards
/// each notification to its current handler, which lets a watcher swap in a
/// decorator without touching existing subscriptions.
pub struct NotifyPort {
    id: ObserverId,
    handler: RefCell<Rc<dyn Observer>>,
}

impl NotifyPort {
    pub(crate) fn new(handler: Rc<dyn Observer>) -> Rc<Self> {
        Rc::new(Self {
            id: ObserverId::new(),
            handler: RefCell::new(handler),
        })
    }

    /// The handler currently receiving notifications.
    pub(crate) fn handler(&self) -> Rc<dyn Observer> {
        self.handler.borrow().clone()
    }

    /// Install a new handler, returning the previous one.
    pub(crate) fn replace(&self, handler: Rc<dyn Observer>) -> Rc<dyn Observer> {
        self.handler.replace(handler)
    }
}

impl Observer for NotifyPort {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn next(&self) {
        // Clone out first: the handler may swap itself while running.
        let handler = self.handler();
        handler.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn observer_ids_are_unique() {
        let id1 = ObserverId::new();
        let id2 = ObserverId::new();
        let id3 = ObserverId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_next_calls_callback() {
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move || called_clone.set(true));

        assert!(!called.get());
        subscriber.next();
        assert!(called.get());
    }

    #[test]
    fn port_forwards_to_replaced_handler() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let first_clone = first.clone();
        let second_clone = second.clone();
        let port = NotifyPort::new(Subscriber::new(move || first_clone.set(first_clone.get() + 1)));

        port.next();
        let previous = port.replace(Subscriber::new(move || {
            second_clone.set(second_clone.get() + 1)
        }));
        port.next();

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 1);

        // Restoring the original keeps the port id stable.
        let id = port.id();
        port.replace(previous);
        port.next();
        assert_eq!(first.get(), 2);
        assert_eq!(port.id(), id);
    }
}
