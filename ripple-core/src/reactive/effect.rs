//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its callback immediately to establish
//!    initial dependencies.
//!
//! 2. The effect is a computed node whose results never compare equal. It is
//!    registered with the watcher, so a dependency change puts it in the
//!    pending set and the next flush re-runs it.
//!
//! 3. A change only dirties the effect; several writes before a flush
//!    collapse into one re-run.
//!
//! # Cleanup
//!
//! The callback may return a cleanup. The cleanup from one run is called
//! once, right before the next run starts, or on [`Effect::dispose`].

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use tracing::debug;

use super::computed::Computed;
use super::context::ContextSlot;
use super::observable::Subscription;
use super::options::Options;
use crate::error::{Outcome, ReactiveError};
use crate::graph::{NodeId, Watcher};

/// Teardown returned by an effect run.
pub type Cleanup = Box<dyn FnOnce()>;

/// Values an effect callback may return.
pub trait IntoCleanup {
    /// Convert into an optional cleanup.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type CleanupSlot = Rc<RefCell<Option<Cleanup>>>;

struct EffectInner {
    node: Computed<()>,
    cleanup: CleanupSlot,
    watcher: Watcher,
    disposed: Cell<bool>,
}

/// A side-effecting computation kept alive by the watcher.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.state(0);
/// let count_clone = count.clone();
///
/// let effect = rt.effect(move || {
///     println!("Count is: {}", count_clone.get());
/// });
///
/// count.set(1);
/// rt.tick(); // prints "Count is: 1"
///
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Build the effect and run it once.
    ///
    /// The effect is not watched yet; see [`Effect::start`].
    pub(crate) fn spawn<F, R, E>(
        callback: F,
        options: Options<()>,
        slot: Rc<ContextSlot>,
        watcher: Watcher,
    ) -> (Self, Outcome<()>)
    where
        F: FnMut() -> Result<R, E> + 'static,
        R: IntoCleanup,
        E: Into<ReactiveError>,
    {
        let label = options.label().unwrap_or("effect").to_owned();
        let options = Options::never_equal().debug(label);

        let cleanup: CleanupSlot = Rc::new(RefCell::new(None));
        let slot_for_run = Rc::clone(&cleanup);
        let callback = RefCell::new(callback);

        let node = Computed::new(
            move || {
                let previous = slot_for_run.borrow_mut().take();
                if let Some(previous) = previous {
                    previous();
                }

                let result = {
                    let mut callback = callback.borrow_mut();
                    (&mut *callback)()
                };
                let next = result.map_err(Into::into)?;
                *slot_for_run.borrow_mut() = next.into_cleanup();
                Ok(())
            },
            options,
            slot,
        );

        let first = node.get();
        let effect = Self {
            inner: Rc::new(EffectInner {
                node,
                cleanup,
                watcher,
                disposed: Cell::new(false),
            }),
        };
        (effect, first)
    }

    /// Register the effect with its watcher.
    pub(crate) fn start(&self) -> Subscription {
        self.inner.watcher.watch(&self.inner.node)
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Get the diagnostic label.
    pub fn label(&self) -> Option<&str> {
        self.inner.node.label()
    }

    /// Stop the effect.
    ///
    /// Runs the pending cleanup, unregisters from the watcher and drops all
    /// dependency subscriptions. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let cleanup = self.inner.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        self.inner.watcher.unwatch(&self.inner.node);
        self.inner.node.detach();
        debug!(node = %self.id(), label = ?self.label(), "effect disposed");
    }

    /// Consume the handle, returning a closure that disposes the effect.
    pub fn into_disposer(self) -> impl FnOnce() {
        move || self.dispose()
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> u64 {
        self.inner.node.run_count()
    }

    /// Number of channels read during the most recent run.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.dependency_count()
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{deferred_flush, Scheduler, TaskQueue};
    use crate::reactive::Signal;
    use std::convert::Infallible;

    struct Fixture {
        slot: Rc<ContextSlot>,
        queue: TaskQueue,
        watcher: Watcher,
    }

    fn fixture() -> Fixture {
        let slot = Rc::new(ContextSlot::new());
        let queue = TaskQueue::new();
        let watcher = Watcher::new(slot.clone(), deferred_flush(Rc::new(queue.clone())));
        Fixture {
            slot,
            queue,
            watcher,
        }
    }

    fn spawn<F, R>(fx: &Fixture, callback: F) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        let mut callback = callback;
        let (effect, first) = Effect::spawn(
            move || Ok::<_, Infallible>(callback()),
            Options::new(),
            fx.slot.clone(),
            fx.watcher.clone(),
        );
        first.unwrap();
        effect.start();
        effect
    }

    #[test]
    fn effect_runs_immediately() {
        let fx = fixture();
        let ran = Rc::new(Cell::new(0));
        let ran_clone = ran.clone();

        let effect = spawn(&fx, move || ran_clone.set(ran_clone.get() + 1));

        assert_eq!(ran.get(), 1);
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.label(), Some("effect"));
    }

    #[test]
    fn effect_disposed_during_flush_does_not_rerun() {
        let fx = fixture();
        let signal = Signal::new(0, Options::new(), fx.slot.clone());
        let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let (signal_clone, victim_clone) = (signal.clone(), victim.clone());
        let _killer = spawn(&fx, move || {
            if signal_clone.get() > 0 {
                if let Some(effect) = victim_clone.borrow().as_ref() {
                    effect.dispose();
                }
            }
        });
        let signal_clone = signal.clone();
        let target = spawn(&fx, move || {
            signal_clone.get();
        });
        *victim.borrow_mut() = Some(target.clone());

        signal.set(1);
        assert_eq!(fx.watcher.pending().len(), 2);
        fx.queue.run_until_idle();

        assert!(target.is_disposed());
        assert_eq!(target.run_count(), 1);
        assert_eq!(target.dependency_count(), 0);
        assert!(fx.watcher.pending().is_empty());
    }

    #[test]
    fn effect_reruns_on_flush_not_on_write() {
        let fx = fixture();
        let signal = Signal::new(0, Options::new(), fx.slot.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (signal_clone, seen_clone) = (signal.clone(), seen.clone());
        let effect = spawn(&fx, move || seen_clone.borrow_mut().push(signal_clone.get()));

        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.borrow(), vec![0]);

        fx.queue.run_until_idle();
        assert_eq!(*seen.borrow(), vec![0, 2]);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn cleanup_runs_before_next_run_and_on_dispose() {
        let fx = fixture();
        let signal = Signal::new(0, Options::new(), fx.slot.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        let (signal_clone, log_clone) = (signal.clone(), log.clone());
        let effect = spawn(&fx, move || -> Cleanup {
            let value = signal_clone.get();
            log_clone.borrow_mut().push(format!("run {value}"));
            let log = log_clone.clone();
            Box::new(move || log.borrow_mut().push(format!("cleanup {value}")))
        });

        signal.set(1);
        fx.queue.run_until_idle();
        effect.dispose();
        effect.dispose();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
        assert!(effect.is_disposed());
    }

    #[test]
    fn disposed_effect_stops_running() {
        let fx = fixture();
        let signal = Signal::new(0, Options::new(), fx.slot.clone());
        let runs = Rc::new(Cell::new(0));

        let (signal_clone, runs_clone) = (signal.clone(), runs.clone());
        let effect = spawn(&fx, move || {
            signal_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(signal.subscriber_count(), 1);

        effect.clone().into_disposer()();
        assert_eq!(signal.subscriber_count(), 0);
        assert!(!fx.watcher.is_watching(effect.id()));

        signal.set(1);
        fx.queue.run_until_idle();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn failing_first_run_is_reported() {
        let fx = fixture();
        let (effect, first) = Effect::spawn(
            || Err::<(), _>("boom"),
            Options::new().debug("failing"),
            fx.slot.clone(),
            fx.watcher.clone(),
        );

        assert_eq!(first.unwrap_err().to_string(), "boom");
        assert_eq!(effect.label(), Some("failing"));
        assert_eq!(fx.watcher.watched_count(), 0);
    }

    #[test]
    fn writes_inside_effect_schedule_another_flush() {
        let fx = fixture();
        let source = Signal::new(0, Options::new(), fx.slot.clone());
        let mirror = Signal::new(0, Options::new(), fx.slot.clone());

        let (source_clone, mirror_clone) = (source.clone(), mirror.clone());
        spawn(&fx, move || {
            mirror_clone.set(source_clone.get() * 10);
        });
        fx.watcher.watch(&mirror);

        source.set(4);
        fx.queue.run_until_idle();

        assert_eq!(mirror.get_untracked(), 40);
        assert_eq!(fx.watcher.pending_count(), 0);
    }
}
