//! Deferred Task Scheduling
//!
//! The watcher never recomputes anything while a write is in progress.
//! Instead it hands a flush task to a [`Scheduler`], which runs it after the
//! current synchronous turn.
//!
//! Two schedulers are provided:
//!
//! - [`TaskQueue`]: an explicit FIFO queue drained by the owner. Tests call
//!   [`Scheduler::run_until_idle`] to force a flush deterministically.
//! - [`LocalSpawner`]: hands each task to `tokio::task::spawn_local`, so the
//!   flush runs on the next tick of a `tokio::task::LocalSet`.
//!
//! Tasks are fire-and-forget: once scheduled they cannot be cancelled, and
//! no coalescing happens beyond what the queue itself does.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks after the current synchronous turn, in FIFO order.
pub trait Scheduler {
    /// Enqueue a task.
    fn schedule(&self, task: Task);

    /// Run queued tasks until none remain, returning how many ran.
    ///
    /// Schedulers driven by an external event loop return 0.
    fn run_until_idle(&self) -> usize {
        0
    }
}

/// A FIFO task queue drained explicitly by its owner.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Whether no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run the oldest task, if any. Returns whether a task ran.
    pub fn run_next(&self) -> bool {
        // Release the queue before running: tasks may schedule more tasks.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}

/// Schedules tasks on the current `tokio::task::LocalSet`.
///
/// Scheduling outside a `LocalSet` panics, as `spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawner;

impl Scheduler for LocalSpawner {
    fn schedule(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}
