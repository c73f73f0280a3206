//! Task runners
//!
//! A runner owns a time-ordered queue of [`Item`](crate::Item)s and decides
//! which thread executes them:
//! - [`PollingTaskRunner`]: no threads, the owner pumps it explicitly
//! - [`ThreadTaskRunner`]: one dedicated thread, strict time order
//! - [`ThreadPoolTaskRunner`]: a service thread promoting due items into an
//!   elastic worker pool
//!
//! Every runner implements the one required primitive of [`TaskRunner`];
//! posting and fan-out helpers are layered on top in [`TaskRunnerExt`].

mod polling;
mod service;
mod thread;
mod thread_pool;

pub use polling::PollingTaskRunner;
pub use thread::ThreadTaskRunner;
pub use thread_pool::{PoolStats, ThreadPoolConfig, ThreadPoolTaskRunner, DEFAULT_KEEP_ALIVE};

use crate::barrier::Barrier;
use crate::item::Task;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Body of an [`apply_task_sync`](TaskRunnerExt::apply_task_sync) fan-out,
/// invoked once per iteration index
pub type ApplyFn = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// Scheduling contract shared by every runner
pub trait TaskRunner: Send + Sync {
    /// Schedule `task` to run once `delay` has elapsed on the runner's clock.
    ///
    /// Tasks with equal due times run in the order they were scheduled.
    fn schedule(&self, task: Task, delay: Duration);

    /// Run `task(i)` for every `i` in `0..iterations`, returning once all
    /// iterations have completed.
    ///
    /// Each index is delivered exactly once; the order across threads is
    /// unspecified. Calling this from inside a task on a runner whose threads
    /// are all busy waits forever.
    ///
    /// # Panics
    ///
    /// Panics if `iterations` is zero.
    fn apply(&self, task: ApplyFn, iterations: usize) {
        let barrier = post_iterations(self, task, iterations);
        barrier.wait();
    }
}

/// Closure-friendly posting helpers, available on every [`TaskRunner`]
/// including `dyn TaskRunner`
pub trait TaskRunnerExt: TaskRunner {
    /// Run `task` as soon as possible
    fn post_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed_task(task, Duration::ZERO);
    }

    /// Run `task` once `delay` has elapsed
    fn post_delayed_task<F>(&self, task: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Box::new(task), delay);
    }

    /// Fan `task` out over `iterations` indices and block until all finish.
    ///
    /// # Panics
    ///
    /// Panics if `iterations` is zero.
    fn apply_task_sync<F>(&self, task: F, iterations: usize)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.apply(Arc::new(task), iterations);
    }
}

impl<R: TaskRunner + ?Sized> TaskRunnerExt for R {}

/// Shared state of one fan-out
struct ApplyState {
    task: ApplyFn,
    next_index: AtomicUsize,
    barrier: Arc<Barrier>,
}

/// Schedule `iterations` immediate postings that each claim a unique index.
///
/// Returns the barrier released by the last iteration.
pub(crate) fn post_iterations<R: TaskRunner + ?Sized>(
    runner: &R,
    task: ApplyFn,
    iterations: usize,
) -> Arc<Barrier> {
    assert!(
        iterations > 0,
        "apply_task_sync requires at least one iteration"
    );

    let barrier = Arc::new(Barrier::new(iterations));
    let state = Arc::new(ApplyState {
        task,
        next_index: AtomicUsize::new(0),
        barrier: barrier.clone(),
    });

    for _ in 0..iterations {
        let state = state.clone();
        runner.schedule(
            Box::new(move || {
                let index = state.next_index.fetch_add(1, Ordering::Relaxed);
                (state.task)(index);
                state.barrier.count_down();
            }),
            Duration::ZERO,
        );
    }

    barrier
}

/// Identity of a threaded runner, used to recognise its own threads
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RunnerId(u64);

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Runner owning the current thread, if any
    static CURRENT_RUNNER: Cell<Option<RunnerId>> = const { Cell::new(None) };
}

impl RunnerId {
    /// Generate a new unique RunnerId
    pub(crate) fn new() -> Self {
        RunnerId(NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Mark the current thread as owned by this runner
    pub(crate) fn enter(self) {
        CURRENT_RUNNER.with(|current| current.set(Some(self)));
    }

    /// Whether the current thread is owned by this runner
    pub(crate) fn is_current(self) -> bool {
        CURRENT_RUNNER.with(|current| current.get() == Some(self))
    }

    /// Get the numeric ID value
    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }
}
