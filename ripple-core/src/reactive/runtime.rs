//! Reactive Runtime
//!
//! The runtime ties the pieces together: one context slot shared by every
//! node it creates, one watcher, and the scheduler the watcher defers its
//! flushes to.
//!
//! # How It Works
//!
//! 1. Nodes created through a runtime share its context slot, so reads inside
//!    a running computation are recorded against that computation.
//!
//! 2. Effects are registered with the runtime's watcher. When a dependency
//!    changes, the effect lands in the pending set and a flush is scheduled.
//!
//! 3. With the default [`TaskQueue`], nothing runs until [`Runtime::tick`]
//!    drains the queue. Use [`LocalSpawner`](crate::graph::LocalSpawner) to
//!    let a tokio `LocalSet` drive flushes instead.
//!
//! # Default Runtime
//!
//! Each thread lazily creates a default runtime, returned by
//! [`Runtime::current`] and used by the free functions in this module.
//! [`Runtime::scope`] swaps it for the duration of a closure, which keeps
//! tests isolated from one another.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::{debug, warn};

use super::computed::Computed;
use super::context::ContextSlot;
use super::effect::{Effect, IntoCleanup};
use super::observable::Subscription;
use super::options::Options;
use super::signal::Signal;
use crate::error::ReactiveError;
use crate::graph::{
    deferred_flush, NotifyFn, PendingEntry, Scheduler, TaskQueue, Trackable, Watcher,
};

thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

struct RuntimeInner {
    context: Rc<ContextSlot>,
    watcher: Watcher,
    scheduler: Rc<dyn Scheduler>,
}

/// An isolated reactive world.
///
/// Cloning a runtime yields another handle to the same world.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime flushing through a [`TaskQueue`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Configure a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// The thread's default runtime, created on first use.
    pub fn current() -> Self {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(Runtime::new)
                .clone()
        })
    }

    /// Replace the thread's default runtime, returning the previous one.
    pub fn set_current(runtime: Runtime) -> Option<Runtime> {
        CURRENT.with(|current| current.borrow_mut().replace(runtime))
    }

    /// Run `f` with this runtime as the thread's default.
    ///
    /// The previous default is restored afterwards, also on panic.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        let _restore = RestoreCurrent(previous);
        f()
    }

    /// Create a signal compared with `PartialEq`.
    pub fn state<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.state_with(value, Options::new())
    }

    /// Create a signal with explicit options.
    pub fn state_with<T>(&self, value: T, options: Options<T>) -> Signal<T>
    where
        T: Clone + 'static,
    {
        Signal::new(value, options, self.context())
    }

    /// Create a computed node from an infallible callback.
    pub fn computed<T, F>(&self, f: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        self.computed_with(f, Options::new())
    }

    /// Create a computed node whose callback may fail.
    ///
    /// The error is cached and handed back by every read until a dependency
    /// changes.
    pub fn try_computed<T, E, F>(&self, f: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        E: Into<ReactiveError>,
        F: Fn() -> Result<T, E> + 'static,
    {
        self.try_computed_with(f, Options::new())
    }

    /// Create a computed node with explicit options.
    pub fn computed_with<T, F>(&self, f: F, options: Options<T>) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(move || Ok(f()), options, self.context())
    }

    /// Create a fallible computed node with explicit options.
    pub fn try_computed_with<T, E, F>(&self, f: F, options: Options<T>) -> Computed<T>
    where
        T: Clone + 'static,
        E: Into<ReactiveError>,
        F: Fn() -> Result<T, E> + 'static,
    {
        Computed::new(move || f().map_err(Into::into), options, self.context())
    }

    /// Run `f` now and again after every change to what it read.
    ///
    /// `f` may return `()` or a [`Cleanup`](super::Cleanup).
    pub fn effect<F, R>(&self, f: F) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        self.effect_with(f, Options::new())
    }

    /// Create an effect with a debug label.
    ///
    /// Equality in `options` is ignored: an effect re-runs on every change.
    pub fn effect_with<F, R>(&self, f: F, options: Options<()>) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        let mut f = f;
        let (effect, first) = Effect::spawn(
            move || Ok::<_, Infallible>(f()),
            options,
            self.context(),
            self.inner.watcher.clone(),
        );
        if let Err(error) = first {
            warn!(node = %effect.id(), %error, "effect failed on its first run");
        }
        effect.start();
        effect
    }

    /// Create an effect whose callback may fail.
    ///
    /// A failing first run is returned and the effect is not kept alive.
    /// Later failures are logged by the flush.
    pub fn try_effect<F, R, E>(&self, f: F) -> Result<Effect, ReactiveError>
    where
        F: FnMut() -> Result<R, E> + 'static,
        R: IntoCleanup,
        E: Into<ReactiveError>,
    {
        self.try_effect_with(f, Options::new())
    }

    /// Fallible effect with a debug label.
    pub fn try_effect_with<F, R, E>(
        &self,
        f: F,
        options: Options<()>,
    ) -> Result<Effect, ReactiveError>
    where
        F: FnMut() -> Result<R, E> + 'static,
        R: IntoCleanup,
        E: Into<ReactiveError>,
    {
        let (effect, first) = Effect::spawn(f, options, self.context(), self.inner.watcher.clone());
        first?;
        effect.start();
        Ok(effect)
    }

    /// Track `node` in this runtime's watcher.
    pub fn watch<N>(&self, node: &N) -> Subscription
    where
        N: Trackable + Clone + 'static,
    {
        self.inner.watcher.watch(node)
    }

    /// Stop tracking `node`.
    pub fn unwatch<N>(&self, node: &N)
    where
        N: Trackable + ?Sized,
    {
        self.inner.watcher.unwatch(node);
    }

    /// Snapshot of the nodes waiting for a flush.
    pub fn pending(&self) -> Vec<PendingEntry> {
        self.inner.watcher.pending()
    }

    /// Run `f` without recording any dependency.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.context.untracked(f)
    }

    /// Whether a computation is currently recording dependencies.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Run scheduled flushes until none remain. Returns how many ran.
    pub fn tick(&self) -> usize {
        self.inner.scheduler.run_until_idle()
    }

    /// Read every pending node right away, bypassing the scheduler.
    pub fn flush(&self) -> usize {
        self.inner.watcher.flush()
    }

    /// The runtime's watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.inner.watcher
    }

    /// The scheduler flushes are deferred to.
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.scheduler)
    }

    /// Unwatch every node. Effects stop re-running; their cleanups do not run.
    pub fn shutdown(&self) {
        self.inner.watcher.shutdown();
        debug!("runtime shut down");
    }

    fn context(&self) -> Rc<ContextSlot> {
        Rc::clone(&self.inner.context)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("watcher", &self.inner.watcher)
            .field("tracking", &self.is_tracking())
            .finish()
    }
}

struct RestoreCurrent(Option<Runtime>);

impl Drop for RestoreCurrent {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = previous);
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    scheduler: Option<Rc<dyn Scheduler>>,
    on_notify: Option<NotifyFn>,
}

impl RuntimeBuilder {
    /// Defer flushes to `scheduler` instead of a fresh [`TaskQueue`].
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Replace the default trigger, which schedules a flush.
    ///
    /// Called after a watched node entered the pending set.
    pub fn on_notify<F>(mut self, notify: F) -> Self
    where
        F: Fn(&Watcher) + 'static,
    {
        self.on_notify = Some(Box::new(notify));
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        let context = Rc::new(ContextSlot::new());
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(TaskQueue::new()));
        let notify = self
            .on_notify
            .unwrap_or_else(|| deferred_flush(Rc::clone(&scheduler)));

        Runtime {
            inner: Rc::new(RuntimeInner {
                watcher: Watcher::new(Rc::clone(&context), notify),
                context,
                scheduler,
            }),
        }
    }
}

impl Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("custom_scheduler", &self.scheduler.is_some())
            .field("custom_notify", &self.on_notify.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Free functions bound to the thread's default runtime
// ----------------------------------------------------------------------------

/// Create a signal in the default runtime.
pub fn state<T>(value: T) -> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    Runtime::current().state(value)
}

/// Create a signal with options in the default runtime.
pub fn state_with<T>(value: T, options: Options<T>) -> Signal<T>
where
    T: Clone + 'static,
{
    Runtime::current().state_with(value, options)
}

/// Create a computed node in the default runtime.
pub fn computed<T, F>(f: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed(f)
}

/// Create a fallible computed node in the default runtime.
pub fn try_computed<T, E, F>(f: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    E: Into<ReactiveError>,
    F: Fn() -> Result<T, E> + 'static,
{
    Runtime::current().try_computed(f)
}

/// Create a computed node with options in the default runtime.
pub fn computed_with<T, F>(f: F, options: Options<T>) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed_with(f, options)
}

/// Create a fallible computed node with options in the default runtime.
pub fn try_computed_with<T, E, F>(f: F, options: Options<T>) -> Computed<T>
where
    T: Clone + 'static,
    E: Into<ReactiveError>,
    F: Fn() -> Result<T, E> + 'static,
{
    Runtime::current().try_computed_with(f, options)
}

/// Create an effect in the default runtime.
pub fn effect<F, R>(f: F) -> Effect
where
    F: FnMut() -> R + 'static,
    R: IntoCleanup,
{
    Runtime::current().effect(f)
}

/// Create a fallible effect in the default runtime.
pub fn try_effect<F, R, E>(f: F) -> Result<Effect, ReactiveError>
where
    F: FnMut() -> Result<R, E> + 'static,
    R: IntoCleanup,
    E: Into<ReactiveError>,
{
    Runtime::current().try_effect(f)
}

/// Create a labeled effect in the default runtime.
pub fn effect_with<F, R>(f: F, options: Options<()>) -> Effect
where
    F: FnMut() -> R + 'static,
    R: IntoCleanup,
{
    Runtime::current().effect_with(f, options)
}

/// Create a labeled fallible effect in the default runtime.
pub fn try_effect_with<F, R, E>(f: F, options: Options<()>) -> Result<Effect, ReactiveError>
where
    F: FnMut() -> Result<R, E> + 'static,
    R: IntoCleanup,
    E: Into<ReactiveError>,
{
    Runtime::current().try_effect_with(f, options)
}

/// Track `node` in the default runtime's watcher.
pub fn watch<N>(node: &N) -> Subscription
where
    N: Trackable + Clone + 'static,
{
    Runtime::current().watch(node)
}

/// Stop tracking `node` in the default runtime's watcher.
pub fn unwatch<N>(node: &N)
where
    N: Trackable + ?Sized,
{
    Runtime::current().unwatch(node);
}

/// Pending nodes of the default runtime's watcher.
pub fn get_pending() -> Vec<PendingEntry> {
    Runtime::current().pending()
}

/// Run `f` without recording dependencies in the default runtime.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untrack(f)
}

/// Drain the default runtime's scheduled flushes.
pub fn tick() -> usize {
    Runtime::current().tick()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runtimes_are_isolated() {
        let rt1 = Runtime::new();
        let rt2 = Runtime::new();

        let a = rt1.state(1);
        let a_clone = a.clone();
        let doubled = rt1.computed(move || a_clone.get() * 2);
        assert_eq!(doubled.get().unwrap(), 2);

        assert!(!rt2.is_tracking());
        let other = rt2.computed(|| 0);
        other.get().unwrap();
        assert_eq!(other.dependency_count(), 0);
    }

    #[test]
    fn scope_replaces_and_restores_default() {
        let outer = Runtime::current();
        let rt = Runtime::new();

        let inner_signal = rt.scope(|| {
            let signal = state(5);
            let runtime = Runtime::current();
            assert!(Rc::ptr_eq(&runtime.inner, &rt.inner));
            signal
        });
        assert_eq!(inner_signal.get(), 5);

        assert!(Rc::ptr_eq(&Runtime::current().inner, &outer.inner));
    }

    #[test]
    fn set_current_returns_previous() {
        let original = Runtime::current();
        let replacement = Runtime::new();

        let previous = Runtime::set_current(replacement.clone());
        assert!(previous.is_some_and(|p| Rc::ptr_eq(&p.inner, &original.inner)));
        assert!(Rc::ptr_eq(&Runtime::current().inner, &replacement.inner));

        Runtime::set_current(original);
    }

    #[test]
    fn effect_waits_for_tick() {
        let rt = Runtime::new();
        let count = rt.state(0);
        let seen = Rc::new(Cell::new(-1));

        let (count_clone, seen_clone) = (count.clone(), seen.clone());
        rt.effect(move || seen_clone.set(count_clone.get()));
        assert_eq!(seen.get(), 0);

        count.set(7);
        assert_eq!(seen.get(), 0);
        assert_eq!(rt.pending().len(), 1);

        assert_eq!(rt.tick(), 1);
        assert_eq!(seen.get(), 7);
        assert!(rt.pending().is_empty());
    }

    #[test]
    fn try_effect_reports_first_failure() {
        let rt = Runtime::new();
        let result = rt.try_effect(|| Err::<(), _>("not ready"));

        assert_eq!(result.unwrap_err().to_string(), "not ready");
        assert_eq!(rt.watcher().watched_count(), 0);
    }

    #[test]
    fn untrack_hides_reads() {
        let rt = Runtime::new();
        let tracked = rt.state(1);
        let hidden = rt.state(10);

        let (t, h) = (tracked.clone(), hidden.clone());
        let runtime = rt.clone();
        let sum = rt.computed(move || t.get() + runtime.untrack(|| h.get()));

        assert_eq!(sum.get().unwrap(), 11);
        assert_eq!(sum.dependency_count(), 1);

        hidden.set(20);
        assert!(!sum.is_dirty());
        assert_eq!(sum.get().unwrap(), 11);

        tracked.set(2);
        assert_eq!(sum.get().unwrap(), 22);
    }

    #[test]
    fn custom_notify_replaces_scheduling() {
        let notified = Rc::new(Cell::new(0));
        let notified_clone = notified.clone();
        let rt = Runtime::builder()
            .on_notify(move |_| notified_clone.set(notified_clone.get() + 1))
            .build();

        let signal = rt.state(0);
        rt.watch(&signal);
        signal.set(1);
        signal.set(2);

        assert_eq!(notified.get(), 2);
        assert_eq!(rt.tick(), 0);
        assert_eq!(rt.flush(), 1);
    }

    #[test]
    fn custom_scheduler_receives_flushes() {
        let queue = TaskQueue::new();
        let rt = Runtime::builder().scheduler(queue.clone()).build();

        let signal = rt.state(0);
        rt.watch(&signal);
        signal.set(1);

        assert_eq!(queue.len(), 1);
        assert_eq!(rt.tick(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn free_functions_accept_options() {
        let rt = Runtime::new();
        rt.scope(|| {
            let input = state(1);
            let (a, b) = (input.clone(), input.clone());

            let bucket = computed_with(move || a.get() / 10, Options::new().debug("bucket"));
            let checked = try_computed_with(
                move || if b.get() < 0 { Err("negative") } else { Ok(b.get()) },
                Options::new().debug("checked"),
            );
            assert_eq!(bucket.label(), Some("bucket"));
            assert_eq!(checked.get().unwrap(), 1);

            let c = checked.clone();
            let fx = effect_with(
                move || {
                    let _ = c.get();
                },
                Options::new().debug("logger"),
            );
            let failing = try_effect_with(|| Err::<(), _>("down"), Options::new().debug("broken"));

            assert_eq!(fx.label(), Some("logger"));
            assert_eq!(failing.unwrap_err().to_string(), "down");

            input.set(-1);
            assert!(checked.get().is_err());
            rt.tick();
            assert_eq!(fx.run_count(), 2);
        });
    }

    #[test]
    fn shutdown_stops_effects() {
        let rt = Runtime::new();
        let signal = rt.state(0);
        let runs = Rc::new(Cell::new(0));

        let (signal_clone, runs_clone) = (signal.clone(), runs.clone());
        let effect = rt.effect(move || {
            signal_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        rt.shutdown();
        signal.set(1);
        rt.tick();

        assert_eq!(runs.get(), 1);
        assert!(!effect.is_disposed());
    }
}
