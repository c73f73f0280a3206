//! Caller-pumped, single-thread runner
//!
//! Nothing runs until the owner calls [`PollingTaskRunner::run_pending_tasks`].
//! That call never blocks: it runs whatever is due at the current clock
//! reading and returns.

use crate::clock::Clock;
use crate::item::{Item, Task};
use crate::runner::{post_iterations, ApplyFn, TaskRunner};
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::mem;
use std::time::Duration;

/// Queue state guarded by the runner's lock
struct PollingState {
    /// Pending items, earliest first
    queue: BinaryHeap<Item>,
    /// Sequence id for the next posted item
    next_id: u64,
    /// Reusable list of due callbacks, taken while they run
    ready: Vec<Task>,
}

/// Single-thread runner pumped by its owner
///
/// Producers may post from any thread; callbacks only ever run inside
/// `run_pending_tasks`. Dropping the runner runs everything already due and
/// discards what is not.
///
/// [`TaskRunner::apply`] pumps on the calling thread, so it must be called
/// from the thread that pumps this runner. Called from any other thread, it
/// would run whatever else is due alongside the owner's own pump.
pub struct PollingTaskRunner {
    clock: Clock,
    state: Mutex<PollingState>,
}

impl PollingTaskRunner {
    /// Create a runner reading due times from `clock`
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(PollingState {
                queue: BinaryHeap::new(),
                next_id: 0,
                ready: Vec::new(),
            }),
        }
    }

    /// Run every item due at the current clock reading, in (due time,
    /// sequence) order.
    ///
    /// Callbacks run without the lock held, so they may post more work; work
    /// they post is picked up by the next call, not this one.
    pub fn run_pending_tasks(&self) {
        let mut ready = {
            let mut state = self.state.lock();
            let now = (self.clock)();
            let mut ready = mem::take(&mut state.ready);
            while state.queue.peek().is_some_and(|top| top.is_due(now)) {
                if let Some(item) = state.queue.pop() {
                    ready.push(item.into_task());
                }
            }
            ready
        };

        for task in ready.drain(..) {
            task();
        }

        // Hand the allocation back for the next pump
        let mut state = self.state.lock();
        if state.ready.capacity() < ready.capacity() {
            state.ready = ready;
        }
    }

    /// Number of items not yet run
    pub fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Due time of the earliest pending item, if any
    pub fn next_due_time(&self) -> Option<Duration> {
        self.state.lock().queue.peek().map(Item::due_time)
    }
}

impl TaskRunner for PollingTaskRunner {
    fn schedule(&self, task: Task, delay: Duration) {
        let mut state = self.state.lock();
        let due_time = (self.clock)().saturating_add(delay);
        let id = state.next_id;
        state.next_id += 1;
        state.queue.push(Item::new(due_time, id, task));
    }

    /// Post the iterations and pump them on the calling thread.
    ///
    /// Call this only from the thread that pumps the runner.
    fn apply(&self, task: ApplyFn, iterations: usize) {
        // No thread of our own would ever run the iterations, so pump them here
        let barrier = post_iterations(self, task, iterations);
        self.run_pending_tasks();
        barrier.wait();
    }
}

impl Drop for PollingTaskRunner {
    fn drop(&mut self) {
        self.run_pending_tasks();
    }
}
