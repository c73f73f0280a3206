//! Service thread holding not-yet-due items
//!
//! Instead of polling for due items, the service thread waits for the next
//! due time using condvar timeouts. Items that come due are handed to a
//! dispatcher: the thread-pool runner forwards them to its workers, the
//! single-thread runner runs them inline.

use crate::barrier::Barrier;
use crate::clock::Clock;
use crate::error::ConfigError;
use crate::item::{Item, Task};
use crate::runner::RunnerId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single condvar wait; far-off due times are re-checked after it
const MAX_WAIT: Duration = Duration::from_secs(60 * 60);

/// Receives each item's callback once it is due, in (due time, sequence) order
pub(crate) type Dispatch = Box<dyn Fn(Task) + Send + 'static>;

/// Service thread state
struct ServiceState {
    /// Items waiting for their due time (min-heap)
    queue: BinaryHeap<Item>,
    /// Sequence id for the next scheduled item
    next_id: u64,
    /// Set once at teardown
    exiting: bool,
}

struct ServiceShared {
    clock: Clock,
    /// Internal state protected by mutex
    state: Mutex<ServiceState>,
    /// Wakes the service thread when an earlier item arrives or on shutdown
    wakeup: Condvar,
}

/// Dedicated thread promoting due items to a dispatcher
pub(crate) struct ServiceTaskRunner {
    id: RunnerId,
    shared: Arc<ServiceShared>,
    /// Thread handle
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceTaskRunner {
    /// Spawn the service thread.
    ///
    /// The thread is tagged with `id`, so a runner can recognise calls made
    /// from inside its own callbacks.
    pub(crate) fn start(
        id: RunnerId,
        clock: Clock,
        thread_name: String,
        dispatch: Dispatch,
    ) -> Result<Self, ConfigError> {
        let shared = Arc::new(ServiceShared {
            clock,
            state: Mutex::new(ServiceState {
                queue: BinaryHeap::new(),
                next_id: 0,
                exiting: false,
            }),
            wakeup: Condvar::new(),
        });

        let service = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                id.enter();
                run_loop(&service, &dispatch);
            })?;

        Ok(Self {
            id,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `task` to be dispatched once `delay` has elapsed
    pub(crate) fn schedule(&self, task: Task, delay: Duration) {
        let mut state = self.shared.state.lock();
        let due_time = (self.shared.clock)().saturating_add(delay);
        let id = state.next_id;
        state.next_id += 1;
        state.queue.push(Item::new(due_time, id, task));
        // The new item may be due earlier than the one being waited for
        self.shared.wakeup.notify_one();
    }

    /// Number of items not yet dispatched
    pub(crate) fn pending_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Block until a sync item posted now has been run.
    ///
    /// Everything already due is dispatched ahead of it. Returns at once when
    /// called from one of the runner's own threads, where waiting could
    /// deadlock.
    pub(crate) fn flush(&self) {
        if self.id.is_current() {
            return;
        }
        let barrier = Arc::new(Barrier::new(1));
        let done = barrier.clone();
        self.schedule(Box::new(move || done.count_down()), Duration::ZERO);
        barrier.wait();
    }

    /// Stop the service thread and join it. Undispatched items are dropped.
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.exiting = true;
            self.shared.wakeup.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            if self.id.is_current() {
                // Dropped from inside one of our own callbacks; the loop exits
                // on its own once the callback returns
                return;
            }
            if handle.join().is_err() {
                tracing::error!(runner = self.id.as_u64(), "Service thread panicked");
            }
        }
    }
}

impl Drop for ServiceTaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Service thread main loop
fn run_loop(shared: &ServiceShared, dispatch: &Dispatch) {
    let mut due: Vec<Task> = Vec::new();
    let mut state = shared.state.lock();

    loop {
        if state.exiting {
            break;
        }

        let now = (shared.clock)();
        while state.queue.peek().is_some_and(|top| top.is_due(now)) {
            if let Some(item) = state.queue.pop() {
                due.push(item.into_task());
            }
        }

        if !due.is_empty() {
            tracing::trace!(count = due.len(), "Dispatching due items");
            MutexGuard::unlocked(&mut state, || {
                for task in due.drain(..) {
                    dispatch(task);
                }
            });
            // Time has moved on while dispatching; re-evaluate
            continue;
        }

        // Sleep until the next due time, or until a new item arrives
        match state.queue.peek().map(Item::due_time) {
            Some(next) => {
                let timeout = next.saturating_sub(now).min(MAX_WAIT);
                shared.wakeup.wait_for(&mut state, timeout);
            }
            None => shared.wakeup.wait(&mut state),
        }
    }

    tracing::debug!(dropped = state.queue.len(), "Service thread shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::monotonic_clock;
    use crossbeam::channel::{self, Receiver, Sender};

    fn channel_service() -> (ServiceTaskRunner, Receiver<u32>, Sender<u32>) {
        let (tx, rx) = channel::unbounded();
        let service = ServiceTaskRunner::start(
            RunnerId::new(),
            monotonic_clock(),
            "taskloom-service-test".to_string(),
            Box::new(|task: Task| task()),
        )
        .unwrap();
        (service, rx, tx)
    }

    #[test]
    fn test_service_dispatches_in_due_order() {
        let (service, rx, tx) = channel_service();

        for (n, delay_ms) in [(3u32, 60u64), (1, 20), (2, 40)] {
            let tx = tx.clone();
            service.schedule(
                Box::new(move || tx.send(n).unwrap()),
                Duration::from_millis(delay_ms),
            );
        }

        let got: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn test_earlier_item_shortens_wait() {
        let (service, rx, tx) = channel_service();

        let late = tx.clone();
        service.schedule(
            Box::new(move || late.send(2).unwrap()),
            Duration::from_secs(30),
        );
        service.schedule(Box::new(move || tx.send(1).unwrap()), Duration::ZERO);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(service.pending_count(), 1);
    }

    #[test]
    fn test_flush_then_shutdown_drops_future_items() {
        let (service, rx, tx) = channel_service();

        let now = tx.clone();
        service.schedule(Box::new(move || now.send(1).unwrap()), Duration::ZERO);
        service.schedule(
            Box::new(move || tx.send(2).unwrap()),
            Duration::from_secs(60),
        );

        service.flush();
        service.shutdown();

        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_huge_delay_neither_overflows_nor_blocks_later_items() {
        let (service, rx, tx) = channel_service();

        let never = tx.clone();
        service.schedule(Box::new(move || never.send(99).unwrap()), Duration::MAX);
        service.schedule(Box::new(move || tx.send(1).unwrap()), Duration::ZERO);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(service.pending_count(), 1);

        service.shutdown();
        assert!(rx.try_recv().is_err());
    }
}
