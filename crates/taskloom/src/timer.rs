//! One-shot timer
//!
//! A timer posts one callback to its runner per [`OneShotTimer::start`]. The
//! posted callback holds only a weak handle to the timer's state plus the
//! generation it was started with, so it does nothing if the timer has been
//! dropped, restarted, stopped, or fired early by the time it runs.

use crate::item::Task;
use crate::runner::{TaskRunner, TaskRunnerExt};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Timer state shared with posted callbacks through a weak handle
#[derive(Default)]
struct TimerState {
    /// Callback of the current generation
    task: Option<Task>,
    /// Whether a fire is pending
    running: bool,
    /// Incremented on every start
    task_id: u64,
}

/// Single delayed callback on a [`TaskRunner`]
///
/// Dropping, stopping or restarting the timer cancels a fire that has not
/// begun. On a multi-threaded runner, a fire that another thread has already
/// begun is not cancelled: the timer may be dropped on one thread while its
/// task runs on another, and that task still runs to completion once.
pub struct OneShotTimer {
    runner: Arc<dyn TaskRunner>,
    state: Arc<Mutex<TimerState>>,
}

impl OneShotTimer {
    /// Create an idle timer posting to `runner`
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            runner,
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Run `task` once `delay` has elapsed.
    ///
    /// Starting a running timer supersedes the pending fire: only the latest
    /// task ever runs.
    pub fn start<F>(&self, task: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        let task_id = {
            let mut state = self.state.lock();
            state.task = Some(Box::new(task));
            state.running = true;
            state.task_id += 1;
            state.task_id
        };

        let handle = Arc::downgrade(&self.state);
        self.runner
            .post_delayed_task(move || run_task(&handle, task_id), delay);
    }

    /// Run the pending task now, on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the timer is not running.
    pub fn fire_now(&self) {
        let task = {
            let mut state = self.state.lock();
            assert!(state.running, "fire_now called on an idle timer");
            state.running = false;
            state.task.take()
        };
        if let Some(task) = task {
            task();
        }
    }

    /// Cancel the pending fire, if any
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.task = None;
    }

    /// Whether a fire is pending
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

/// Posted callback body
fn run_task(handle: &Weak<Mutex<TimerState>>, task_id: u64) {
    // Timer dropped: nothing to do
    let Some(state) = handle.upgrade() else {
        return;
    };

    let task = {
        let mut guard = state.lock();
        if !guard.running || guard.task_id != task_id {
            return;
        }
        guard.running = false;
        guard.task.take()
    };
    drop(state);

    if let Some(task) = task {
        task();
    }
}
