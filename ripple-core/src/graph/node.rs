//! Graph Nodes
//!
//! Identity and the seam through which the watcher handles signals and
//! computed nodes uniformly.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ReactiveError;
use crate::reactive::{NotifyPort, Observable};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a watcher hooks into a node's notifications.
pub enum NotifyTarget<'a> {
    /// A plain signal: the watcher listens on its channel.
    Channel(&'a Observable),
    /// A computed node: the watcher decorates its entry point.
    Port(&'a NotifyPort),
}

/// Callback fired when a node is read.
pub type ReadFn = Rc<dyn Fn()>;

/// Slot for an optional read callback, installed by a watcher.
#[derive(Default)]
pub struct ReadHook {
    hook: RefCell<Option<ReadFn>>,
}

impl ReadHook {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook`, returning whatever was installed before.
    pub fn replace(&self, hook: Option<ReadFn>) -> Option<ReadFn> {
        std::mem::replace(&mut *self.hook.borrow_mut(), hook)
    }

    /// Whether a callback is installed.
    pub fn is_set(&self) -> bool {
        self.hook.borrow().is_some()
    }

    /// Call the installed callback, if any.
    pub fn fire(&self) {
        // The callback may replace the hook.
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl std::fmt::Debug for ReadHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHook").field("set", &self.is_set()).finish()
    }
}

/// A node the watcher can track.
pub trait Trackable {
    /// Stable identity of the node.
    fn node_id(&self) -> NodeId;

    /// Diagnostic label, if one was given.
    fn label(&self) -> Option<&str>;

    /// Read the node, recomputing it if it is stale, and discard the value.
    fn refresh(&self) -> Result<(), ReactiveError>;

    /// How notifications reach this node.
    fn notify_target(&self) -> NotifyTarget<'_>;

    /// Fired on every read through the node's `get`.
    fn read_hook(&self) -> &ReadHook;
}
