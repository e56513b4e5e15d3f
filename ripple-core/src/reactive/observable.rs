//! Notification Channels
//!
//! The publish/subscribe primitive underneath signals, computed nodes and the
//! watcher. A channel offers exactly three capabilities:
//!
//! - `subscribe(observer) -> Subscription`
//! - `unsubscribe(observer)`
//! - `notify_all()`
//!
//! Observers are held weakly. A node that goes away simply stops receiving
//! notifications; its stale entry is pruned on the next broadcast. This keeps
//! reference cycles out of the graph even though closures routinely capture
//! the signals they read.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Observer, ObserverId};

/// Unique identifier for a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct ObservableInner {
    id: ChannelId,
    /// Insertion order is notification order.
    observers: RefCell<IndexMap<ObserverId, Weak<dyn Observer>>>,
}

/// A broadcast channel. Cloning shares the subscriber list.
#[derive(Clone)]
pub struct Observable {
    inner: Rc<ObservableInner>,
}

impl Observable {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                id: ChannelId::next(),
                observers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the channel's unique ID.
    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    /// Subscribe an observer.
    ///
    /// Subscribing an observer that is already present replaces its entry
    /// and keeps its position.
    pub fn subscribe(&self, observer: Rc<dyn Observer>) -> Subscription {
        let id = observer.id();
        self.inner
            .observers
            .borrow_mut()
            .insert(id, Rc::downgrade(&observer));

        Subscription {
            channel: Rc::downgrade(&self.inner),
            observer: id,
        }
    }

    /// Remove an observer. Returns whether it was subscribed.
    pub fn unsubscribe(&self, observer: ObserverId) -> bool {
        self.inner
            .observers
            .borrow_mut()
            .shift_remove(&observer)
            .is_some()
    }

    /// Notify every live observer, in subscription order.
    ///
    /// The subscriber list is snapshotted first, so observers may subscribe
    /// or unsubscribe while the broadcast is in flight.
    pub fn notify_all(&self) {
        let observers: SmallVec<[Rc<dyn Observer>; 4]> = {
            let mut observers = self.inner.observers.borrow_mut();
            observers.retain(|_, observer| observer.strong_count() > 0);
            observers.values().filter_map(Weak::upgrade).collect()
        };

        for observer in observers {
            observer.next();
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .values()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    /// Whether the given observer is currently subscribed.
    pub fn is_subscribed(&self, observer: ObserverId) -> bool {
        self.inner.observers.borrow().contains_key(&observer)
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    channel: Weak<ObservableInner>,
    observer: ObserverId,
}

impl Subscription {
    /// Remove the observer from the channel. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.observers.borrow_mut().shift_remove(&self.observer);
        }
    }

    /// The subscribed observer.
    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Whether the channel still exists and the observer is still on it.
    pub fn is_active(&self) -> bool {
        self.channel
            .upgrade()
            .map(|channel| channel.observers.borrow().contains_key(&self.observer))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Subscriber;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Rc<Subscriber>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let subscriber = Subscriber::new(move || count_clone.set(count_clone.get() + 1));
        (count, subscriber)
    }

    #[test]
    fn notify_reaches_every_subscriber() {
        let channel = Observable::new();
        let (a, sub_a) = counter();
        let (b, sub_b) = counter();

        channel.subscribe(sub_a.clone());
        channel.subscribe(sub_b.clone());
        channel.notify_all();

        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 1);
        assert_eq!(channel.observer_count(), 2);
    }

    #[test]
    fn subscribing_twice_is_idempotent() {
        let channel = Observable::new();
        let (count, subscriber) = counter();

        channel.subscribe(subscriber.clone());
        channel.subscribe(subscriber.clone());
        channel.notify_all();

        assert_eq!(count.get(), 1);
        assert_eq!(channel.observer_count(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let channel = Observable::new();
        let (count, subscriber) = counter();

        let subscription = channel.subscribe(subscriber.clone());
        assert!(subscription.is_active());

        channel.notify_all();
        subscription.unsubscribe();
        channel.notify_all();

        assert_eq!(count.get(), 1);
        assert!(!subscription.is_active());

        // Second unsubscribe is a no-op.
        subscription.unsubscribe();
        assert!(!channel.unsubscribe(subscriber.id()));
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let channel = Observable::new();
        let (count, subscriber) = counter();

        channel.subscribe(subscriber.clone());
        drop(subscriber);

        channel.notify_all();
        assert_eq!(count.get(), 0);
        assert_eq!(channel.observer_count(), 0);
    }

    #[test]
    fn observer_may_unsubscribe_during_broadcast() {
        let channel = Observable::new();
        let channel_clone = channel.clone();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();

        let subscriber = Subscriber::new(move || {
            if let Some(subscription) = slot_clone.borrow().as_ref() {
                subscription.unsubscribe();
            }
            let _ = channel_clone.observer_count();
        });
        *slot.borrow_mut() = Some(channel.subscribe(subscriber.clone()));

        channel.notify_all();
        assert_eq!(channel.observer_count(), 0);
    }
}
