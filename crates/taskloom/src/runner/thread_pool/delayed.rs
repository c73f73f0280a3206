//! Ready queue with an elastic worker pool
//!
//! Workers are spawned on demand up to `max_threads` and retire after
//! `keep_alive` without work. Every live worker is registered under the same
//! lock as the ready queue, so teardown can join all of them.

use crate::item::Task;
use crate::runner::RunnerId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::PoolStats;

/// Identifier of a worker within one pool
type WorkerId = u64;

/// Ready queue and worker registry, guarded by one lock
struct DelayedState {
    /// Due callbacks waiting for a worker
    ready: VecDeque<Task>,
    /// Live workers
    workers: FxHashMap<WorkerId, JoinHandle<()>>,
    /// Id for the next spawned worker
    next_worker_id: WorkerId,
    /// Set once at teardown
    exiting: bool,
    /// Lifetime counters
    peak_workers: usize,
    spawned_workers: u64,
    retired_workers: u64,
}

struct DelayedShared {
    runner: RunnerId,
    max_threads: usize,
    keep_alive: Duration,
    thread_name: String,
    state: Mutex<DelayedState>,
    /// Signalled when work arrives or on shutdown
    available: Condvar,
}

/// Elastic pool executing ready callbacks in FIFO order
pub(crate) struct DelayedTaskRunner {
    shared: Arc<DelayedShared>,
}

impl DelayedTaskRunner {
    /// Create an empty pool. No thread is started until work arrives.
    pub(crate) fn new(
        runner: RunnerId,
        max_threads: usize,
        keep_alive: Duration,
        thread_name: String,
    ) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        Self {
            shared: Arc::new(DelayedShared {
                runner,
                max_threads,
                keep_alive,
                thread_name,
                state: Mutex::new(DelayedState {
                    ready: VecDeque::new(),
                    workers: FxHashMap::default(),
                    next_worker_id: 0,
                    exiting: false,
                    peak_workers: 0,
                    spawned_workers: 0,
                    retired_workers: 0,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueue a due callback, spawning a worker while below the ceiling
    pub(crate) fn push_task(&self, task: Task) {
        let mut state = self.shared.state.lock();
        state.ready.push_back(task);

        if state.workers.len() < self.shared.max_threads && !state.exiting {
            spawn_worker(&self.shared, &mut state);
        } else {
            self.shared.available.notify_one();
        }
    }

    /// Snapshot of the pool counters
    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            live_workers: state.workers.len(),
            peak_workers: state.peak_workers,
            spawned_workers: state.spawned_workers,
            retired_workers: state.retired_workers,
            queued_tasks: state.ready.len(),
            scheduled_tasks: 0,
        }
    }

    /// Wake every worker, let them drain the ready queue, and join them
    pub(crate) fn shutdown(&self) {
        let workers: Vec<_> = {
            let mut state = self.shared.state.lock();
            state.exiting = true;
            self.shared.available.notify_all();
            state.workers.drain().collect()
        };

        tracing::debug!(
            runner = self.shared.runner.as_u64(),
            workers = workers.len(),
            "Joining pool workers"
        );

        let current = thread::current().id();
        for (id, handle) in workers {
            if handle.thread().id() == current {
                // Teardown triggered from inside a task on this worker
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(worker = id, "Pool worker panicked");
            }
        }
    }
}

impl Drop for DelayedTaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start a worker and register it. Called with the state lock held, so the
/// worker cannot deregister before it is registered.
fn spawn_worker(shared: &Arc<DelayedShared>, state: &mut DelayedState) {
    let id = state.next_worker_id;
    let worker = Arc::clone(shared);

    let spawned = thread::Builder::new()
        .name(format!("{}-{}", shared.thread_name, id))
        .spawn(move || {
            worker.runner.enter();
            run_worker(&worker, id);
        });

    match spawned {
        Ok(handle) => {
            state.next_worker_id += 1;
            state.workers.insert(id, handle);
            state.spawned_workers += 1;
            state.peak_workers = state.peak_workers.max(state.workers.len());
            tracing::debug!(worker = id, live = state.workers.len(), "Spawned pool worker");
        }
        Err(e) if !state.workers.is_empty() => {
            // A live worker will still pick the task up
            tracing::error!(error = %e, "Failed to spawn pool worker");
            shared.available.notify_one();
        }
        Err(e) => panic!("Failed to spawn pool worker with no live workers: {}", e),
    }
}

/// Removes a worker from the registry if a task panics on it. A worker that
/// exits normally deregisters itself under the lock and disarms this guard.
struct Registration<'a> {
    shared: &'a DelayedShared,
    id: WorkerId,
    armed: bool,
}

impl Registration<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            state.workers.remove(&self.id);
        }
    }
}

/// Worker thread main loop
fn run_worker(shared: &DelayedShared, id: WorkerId) {
    let mut registration = Registration {
        shared,
        id,
        armed: true,
    };
    let mut state = shared.state.lock();

    loop {
        if let Some(task) = state.ready.pop_front() {
            MutexGuard::unlocked(&mut state, task);
            continue;
        }
        if state.exiting {
            break;
        }

        // Idle: wait for work until the keep-alive deadline passes
        let deadline = Instant::now().checked_add(shared.keep_alive);
        let mut timed_out = false;
        while state.ready.is_empty() && !state.exiting && !timed_out {
            match deadline {
                Some(deadline) => {
                    timed_out = shared.available.wait_until(&mut state, deadline).timed_out();
                }
                // Keep-alive too long to represent: never retire
                None => shared.available.wait(&mut state),
            }
        }

        if timed_out && state.ready.is_empty() && !state.exiting {
            state.retired_workers += 1;
            tracing::debug!(worker = id, "Retiring idle pool worker");
            break;
        }
    }

    // Leave the registry in the same critical section as the decision to
    // exit, so a concurrent `push_task` sees the freed slot and spawns
    state.workers.remove(&id);
    registration.disarm();
    drop(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(max_threads: usize, keep_alive: Duration) -> DelayedTaskRunner {
        DelayedTaskRunner::new(
            RunnerId::new(),
            max_threads,
            keep_alive,
            "taskloom-delayed-test".to_string(),
        )
    }

    #[test]
    fn test_no_workers_until_work_arrives() {
        let pool = pool(2, Duration::from_secs(1));
        assert_eq!(pool.stats().live_workers, 0);
        assert_eq!(pool.stats().spawned_workers, 0);
    }

    #[test]
    fn test_single_worker_runs_fifo() {
        let pool = pool(1, Duration::from_secs(5));
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..50 {
            let log = log.clone();
            pool.push_task(Box::new(move || log.lock().push(n)));
        }
        pool.shutdown();

        assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
        assert_eq!(pool.stats().peak_workers, 1);
    }

    #[test]
    fn test_shutdown_drains_ready_queue() {
        let pool = pool(3, Duration::from_secs(5));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let done = done.clone();
            pool.push_task(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(pool.stats().live_workers, 0);
    }

    #[test]
    fn test_idle_worker_retires() {
        let pool = pool(1, Duration::from_millis(20));
        pool.push_task(Box::new(|| {}));

        let start = Instant::now();
        while pool.stats().live_workers > 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "worker never retired");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.stats().retired_workers, 1);
    }

    #[test]
    fn test_registry_tracks_retirement_atomically() {
        let pool = pool(1, Duration::from_millis(1));

        for i in 0..200u64 {
            pool.push_task(Box::new(|| {}));
            thread::sleep(Duration::from_micros((i % 6) * 400));

            // Spawn and retirement each update counters and registry together
            let stats = pool.stats();
            assert_eq!(
                stats.spawned_workers - stats.retired_workers,
                stats.live_workers as u64,
                "{:?}",
                stats
            );
        }
    }

    #[test]
    fn test_post_at_keep_alive_boundary_always_runs() {
        let pool = pool(1, Duration::from_millis(2));
        let (tx, rx) = channel::unbounded();

        for i in 0..300u64 {
            let tx = tx.clone();
            pool.push_task(Box::new(move || tx.send(i).unwrap()));
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(i));
            // Land the next post before, at, and after the keep-alive deadline
            thread::sleep(Duration::from_micros((i % 8) * 500));
        }

        assert!(pool.stats().live_workers <= 1);
    }
}
