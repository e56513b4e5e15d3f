//! Watcher
//!
//! The watcher keeps a set of *pending* nodes: tracked nodes that were
//! notified since they were last read. Every notification also fires the
//! watcher's notify trigger, which by default schedules a deferred flush that
//! reads each pending node and so lets effects catch up without blocking the
//! write that dirtied them.
//!
//! # Interception
//!
//! Watching a node installs a [`WatchHook`]:
//!
//! - for a signal, the hook subscribes to the signal's channel;
//! - for a computed node, the hook replaces the handler behind the node's
//!   [`NotifyPort`] and forwards to the original handler, so the node still
//!   goes dirty and informs its own dependents.
//!
//! Watching also installs a read hook on the node, so any read through the
//! node's `get` takes it out of the pending set again.
//!
//! Which nodes are intercepted, and what to restore on `unwatch`, lives in a
//! side table keyed by [`NodeId`].
//!
//! [`NotifyPort`]: crate::reactive::NotifyPort

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::node::{NodeId, NotifyTarget, ReadFn, Trackable};
use super::scheduler::Scheduler;
use crate::error::ReactiveError;
use crate::reactive::{ContextSlot, Observable, Observer, ObserverId, Subscription};

/// Trigger invoked after a watched node was added to the pending set.
pub type NotifyFn = Box<dyn Fn(&Watcher)>;

/// The default trigger: schedule a flush on `scheduler`.
pub fn deferred_flush(scheduler: Rc<dyn Scheduler>) -> NotifyFn {
    Box::new(move |watcher: &Watcher| {
        let watcher = watcher.downgrade();
        scheduler.schedule(Box::new(move || {
            if let Some(watcher) = watcher.upgrade() {
                watcher.flush();
            }
        }));
    })
}

struct WatcherInner {
    context: Rc<ContextSlot>,
    /// Insertion-ordered so flushes read nodes in the order they went stale.
    pending: RefCell<IndexMap<NodeId, Rc<dyn Trackable>>>,
    watched: RefCell<HashMap<NodeId, Watched>>,
    /// Every hook subscribes here; broadcasting marks all watched nodes.
    channel: Observable,
    notify: NotifyFn,
}

/// Side-table entry for an intercepted node.
struct Watched {
    node: Rc<dyn Trackable>,
    hook: Rc<WatchHook>,
    attachment: Attachment,
    /// Read hook that was installed before ours.
    previous_read: Option<ReadFn>,
}

/// What `unwatch` has to undo.
enum Attachment {
    /// Hook subscribed to a signal's channel.
    Channel(Subscription),
    /// Hook installed on a port; holds the handler to restore.
    Port(Rc<dyn Observer>),
}

/// Decorator placed on a watched node's notifications.
struct WatchHook {
    id: ObserverId,
    node: NodeId,
    forward: Option<Rc<dyn Observer>>,
    watcher: Weak<WatcherInner>,
}

impl Observer for WatchHook {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn next(&self) {
        let Some(inner) = self.watcher.upgrade() else {
            if let Some(forward) = &self.forward {
                forward.next();
            }
            return;
        };
        let watcher = Watcher { inner };

        // Bookkeeping must never show up as a dependency of whatever is running.
        watcher.inner.context.untracked(|| {
            watcher.mark_pending(self.node);
            if let Some(forward) = &self.forward {
                forward.next();
            }
            (watcher.inner.notify)(&watcher);
        });
    }
}

/// Tracks dirty-and-interesting nodes and defers their re-read.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher sharing `context` with the nodes it will track.
    pub fn new(context: Rc<ContextSlot>, notify: NotifyFn) -> Self {
        Self {
            inner: Rc::new(WatcherInner {
                context,
                pending: RefCell::new(IndexMap::new()),
                watched: RefCell::new(HashMap::new()),
                channel: Observable::new(),
                notify,
            }),
        }
    }

    /// Start tracking `node`.
    ///
    /// Watching does not mark the node pending: it enters the pending set on
    /// its next notification. Watching an already watched node keeps the
    /// existing interception. Returns the node's subscription to this
    /// watcher's own channel.
    pub fn watch<N>(&self, node: &N) -> Subscription
    where
        N: Trackable + Clone + 'static,
    {
        let id = node.node_id();
        let existing = self
            .inner
            .watched
            .borrow()
            .get(&id)
            .map(|watched| Rc::clone(&watched.hook));
        if let Some(hook) = existing {
            return self.inner.channel.subscribe(hook);
        }

        let node: Rc<dyn Trackable> = Rc::new(node.clone());
        let (hook, attachment) = match node.notify_target() {
            NotifyTarget::Channel(channel) => {
                let hook = self.hook(id, None);
                let subscription = channel.subscribe(hook.clone());
                (hook, Attachment::Channel(subscription))
            }
            NotifyTarget::Port(port) => {
                let original = port.handler();
                let hook = self.hook(id, Some(Rc::clone(&original)));
                port.replace(hook.clone());
                (hook, Attachment::Port(original))
            }
        };

        let previous_read = node.read_hook().replace(Some(self.claim_on_read(id)));

        debug!(node = %id, label = ?node.label(), "watching node");
        let subscription = self.inner.channel.subscribe(hook.clone());
        self.inner.watched.borrow_mut().insert(
            id,
            Watched {
                node,
                hook,
                attachment,
                previous_read,
            },
        );
        subscription
    }

    /// Stop tracking `node` and restore its original notification handling.
    ///
    /// Does not interrupt a run in progress and does not run effect cleanups.
    pub fn unwatch<N>(&self, node: &N)
    where
        N: Trackable + ?Sized,
    {
        let id = node.node_id();
        let Some(watched) = self.inner.watched.borrow_mut().remove(&id) else {
            return;
        };

        self.detach(watched);
        self.inner.pending.borrow_mut().shift_remove(&id);
        debug!(node = %id, "unwatched node");
    }

    /// Snapshot of the pending set.
    ///
    /// Reading an entry removes it from the pending set.
    pub fn pending(&self) -> Vec<PendingEntry> {
        self.inner
            .pending
            .borrow()
            .values()
            .map(|node| PendingEntry {
                node: Rc::clone(node),
                watcher: Rc::downgrade(&self.inner),
            })
            .collect()
    }

    /// Number of pending nodes.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Whether `node` is currently tracked.
    pub fn is_watching(&self, node: NodeId) -> bool {
        self.inner.watched.borrow().contains_key(&node)
    }

    /// Number of tracked nodes.
    pub fn watched_count(&self) -> usize {
        self.inner.watched.borrow().len()
    }

    /// Read every pending node now. Returns how many were read.
    ///
    /// Failures are logged and do not stop the flush.
    pub fn flush(&self) -> usize {
        let entries = self.pending();
        if !entries.is_empty() {
            debug!(count = entries.len(), "flushing pending nodes");
        }

        for entry in &entries {
            if let Err(error) = entry.get() {
                warn!(
                    node = %entry.node_id(),
                    label = ?entry.label(),
                    %error,
                    "pending node failed to refresh"
                );
            }
        }
        entries.len()
    }

    /// Treat every watched node as notified.
    pub fn notify_all(&self) {
        self.inner.channel.notify_all();
    }

    /// Unwatch everything and forget all pending nodes.
    pub fn shutdown(&self) {
        let watched: Vec<Watched> = self
            .inner
            .watched
            .borrow_mut()
            .drain()
            .map(|(_, watched)| watched)
            .collect();
        let count = watched.len();

        for watched in watched {
            self.detach(watched);
        }
        self.inner.pending.borrow_mut().clear();
        debug!(count, "watcher shut down");
    }

    /// A handle that does not keep the watcher alive.
    pub fn downgrade(&self) -> WeakWatcher {
        WeakWatcher {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn hook(&self, node: NodeId, forward: Option<Rc<dyn Observer>>) -> Rc<WatchHook> {
        Rc::new(WatchHook {
            id: ObserverId::new(),
            node,
            forward,
            watcher: Rc::downgrade(&self.inner),
        })
    }

    /// Read hook taking `id` out of the pending set.
    fn claim_on_read(&self, id: NodeId) -> ReadFn {
        let watcher = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = watcher.upgrade() {
                inner.context.untracked(|| {
                    inner.pending.borrow_mut().shift_remove(&id);
                });
            }
        })
    }

    fn mark_pending(&self, id: NodeId) {
        let node = self
            .inner
            .watched
            .borrow()
            .get(&id)
            .map(|watched| Rc::clone(&watched.node));

        if let Some(node) = node {
            self.inner.pending.borrow_mut().insert(id, node);
        }
    }

    fn detach(&self, watched: Watched) {
        match watched.attachment {
            Attachment::Channel(subscription) => subscription.unsubscribe(),
            Attachment::Port(original) => {
                if let NotifyTarget::Port(port) = watched.node.notify_target() {
                    port.replace(original);
                }
            }
        }
        watched.node.read_hook().replace(watched.previous_read);
        self.inner.channel.unsubscribe(watched.hook.id);
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watched", &self.watched_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Weak handle to a [`Watcher`].
#[derive(Clone)]
pub struct WeakWatcher {
    inner: Weak<WatcherInner>,
}

impl WeakWatcher {
    /// Get the watcher back if it still exists.
    pub fn upgrade(&self) -> Option<Watcher> {
        self.inner.upgrade().map(|inner| Watcher { inner })
    }
}

/// One node from a [`Watcher::pending`] snapshot.
pub struct PendingEntry {
    node: Rc<dyn Trackable>,
    watcher: Weak<WatcherInner>,
}

impl PendingEntry {
    /// Identity of the pending node.
    pub fn node_id(&self) -> NodeId {
        self.node.node_id()
    }

    /// Diagnostic label of the pending node.
    pub fn label(&self) -> Option<&str> {
        self.node.label()
    }

    /// Read the node, recomputing it if stale.
    ///
    /// Reading removes the node from the pending set. Neither the removal
    /// nor the read is recorded as a dependency. A node unwatched since the
    /// snapshot was taken is skipped.
    pub fn get(&self) -> Result<(), ReactiveError> {
        let Some(inner) = self.watcher.upgrade() else {
            return self.node.refresh();
        };

        if !inner.watched.borrow().contains_key(&self.node.node_id()) {
            return Ok(());
        }
        inner.context.untracked(|| self.node.refresh())
    }
}

impl std::fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEntry")
            .field("node", &self.node.node_id())
            .field("label", &self.node.label())
            .finish()
    }
}
