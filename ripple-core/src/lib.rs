//! Ripple Core
//!
//! A small, single-threaded reactive runtime:
//!
//! - Signals holding mutable values
//! - Lazily evaluated, memoized computed nodes with error caching
//! - Effects re-run through a watcher with a deferred flush
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: signals, computed nodes, effects, dependency tracking and
//!   the runtime
//! - `graph`: node identity, the watcher's pending set and flush scheduling
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{computed, effect, state, tick};
//!
//! // Create a signal
//! let count = state(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = computed(move || c.get() * 2);
//!
//! // Create an effect
//! let d = doubled.clone();
//! effect(move || {
//!     println!("Doubled: {}", d.get().unwrap_or_default());
//! });
//!
//! // Update the signal, then let the scheduled flush run
//! count.set(5);
//! tick(); // prints "Doubled: 10"
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{Outcome, ReactiveError};
pub use graph::{LocalSpawner, NodeId, PendingEntry, Scheduler, TaskQueue, Trackable, Watcher};
pub use reactive::{
    computed, computed_with, effect, effect_with, get_pending, state, state_with, tick,
    try_computed, try_computed_with, try_effect, try_effect_with, untrack, unwatch, watch,
    Cleanup, Computed, ComputedState, Effect, IntoCleanup, Options, Runtime, RuntimeBuilder,
    Signal, Subscription,
};
