//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed nodes
//! and effects, plus the runtime that ties them together.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read while a
//! computation is running, the signal records that computation as a
//! dependent. When the value changes, every dependent is notified.
//!
//! ## Computed Nodes
//!
//! A Computed node is a derived value that caches its result. A notification
//! only marks it dirty; it re-evaluates on the next read. Errors returned by
//! the callback are cached like values.
//!
//! ## Effects
//!
//! An Effect is a computed node kept alive by the runtime's watcher. Changes
//! to what it read put it in the watcher's pending set, and the next flush
//! runs it again.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically. Each runtime owns a context slot
//! holding the dependency context of the computation currently running; a
//! signal read while the slot is occupied subscribes that computation.

mod signal;
mod context;
mod subscriber;
mod observable;
mod options;
mod computed;
mod effect;
mod runtime;

pub use signal::Signal;
pub use context::{ContextGuard, ContextSlot, DependencyContext};
pub use subscriber::{NotifyPort, Observer, ObserverId, Subscriber};
pub use observable::{ChannelId, Observable, Subscription};
pub use options::{EqualsFn, Options};
pub use computed::{Computed, ComputedState};
pub use effect::{Cleanup, Effect, IntoCleanup};
pub use runtime::{
    computed, computed_with, effect, effect_with, get_pending, state, state_with, tick,
    try_computed, try_computed_with, try_effect, try_effect_with, untrack, unwatch, watch,
    Runtime, RuntimeBuilder,
};
