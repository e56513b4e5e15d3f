//! Dependency Graph Bookkeeping
//!
//! Edges between nodes live in the nodes themselves: every computation owns
//! a dependency context holding its subscriptions. This module covers what
//! sits on top of those edges.
//!
//! - [`NodeId`] and [`Trackable`]: identity, and the seam through which
//!   signals and computed nodes are handled uniformly.
//! - [`Watcher`]: the pending set of stale nodes somebody cares about.
//! - [`Scheduler`]: where the watcher defers its flush to.
//!
//! # Propagation
//!
//! A write never recomputes anything. Notifications only flip dirty flags
//! along the dependents, and watched nodes land in the pending set. The
//! deferred flush then reads each pending node, which recomputes exactly the
//! dirty part of the graph reachable from it.

mod node;
mod scheduler;
mod watcher;

pub use node::{NodeId, NotifyTarget, ReadFn, ReadHook, Trackable};
pub use scheduler::{LocalSpawner, Scheduler, Task, TaskQueue};
pub use watcher::{deferred_flush, NotifyFn, PendingEntry, WeakWatcher, Watcher};
