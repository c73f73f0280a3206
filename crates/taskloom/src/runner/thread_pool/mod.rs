//! Multi-thread runner
//!
//! One service thread holds not-yet-due items and promotes them, once due,
//! into the ready queue of an elastic worker pool. Items with equal due times
//! are promoted in post order; once in the ready queue, items picked up by
//! different workers may run concurrently in any order.

mod delayed;

use self::delayed::DelayedTaskRunner;
use crate::clock::Clock;
use crate::error::ConfigError;
use crate::item::Task;
use crate::runner::service::ServiceTaskRunner;
use crate::runner::{RunnerId, TaskRunner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default idle time after which a worker retires
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Thread pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Ceiling on concurrently live workers
    pub max_threads: usize,

    /// Idle time after which a worker retires
    pub keep_alive: Duration,

    /// Prefix for thread names; workers get `-<n>`, the service thread `-service`
    pub thread_name: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            thread_name: "taskloom-worker".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Set the worker ceiling
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the idle keep-alive
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Check the settings before any thread is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.keep_alive.is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }
}

/// Thread pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers currently registered
    pub live_workers: usize,

    /// Highest number of workers ever live at once
    pub peak_workers: usize,

    /// Total workers started
    pub spawned_workers: u64,

    /// Total workers retired after idling past the keep-alive
    pub retired_workers: u64,

    /// Due callbacks waiting for a worker
    pub queued_tasks: usize,

    /// Items still waiting for their due time
    pub scheduled_tasks: usize,
}

/// Runner executing due items on an elastic pool of worker threads
///
/// Dropping the pool first waits for a sync item posted at drop time, so work
/// that was already due gets run, then stops the service thread (dropping
/// items not yet due) and joins every worker.
pub struct ThreadPoolTaskRunner {
    id: RunnerId,
    service: ServiceTaskRunner,
    delayed: Arc<DelayedTaskRunner>,
}

impl ThreadPoolTaskRunner {
    /// Create a pool with up to `max_threads` workers retiring after
    /// `keep_alive` idle.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero or the service thread cannot start.
    pub fn new(clock: Clock, max_threads: usize, keep_alive: Duration) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        let config = ThreadPoolConfig::default()
            .with_max_threads(max_threads)
            .with_keep_alive(keep_alive);
        match Self::with_config(clock, config) {
            Ok(pool) => pool,
            Err(e) => panic!("Failed to start thread pool: {}", e),
        }
    }

    /// Create a pool from validated settings
    pub fn with_config(clock: Clock, config: ThreadPoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let id = RunnerId::new();
        let delayed = Arc::new(DelayedTaskRunner::new(
            id,
            config.max_threads,
            config.keep_alive,
            config.thread_name.clone(),
        ));

        let ready = Arc::clone(&delayed);
        let service = ServiceTaskRunner::start(
            id,
            clock,
            format!("{}-service", config.thread_name),
            Box::new(move |task| ready.push_task(task)),
        )?;

        tracing::debug!(
            runner = id.as_u64(),
            max_threads = config.max_threads,
            keep_alive = ?config.keep_alive,
            "Started thread pool"
        );

        Ok(Self {
            id,
            service,
            delayed,
        })
    }

    /// Snapshot of worker and queue counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            scheduled_tasks: self.service.pending_count(),
            ..self.delayed.stats()
        }
    }
}

impl TaskRunner for ThreadPoolTaskRunner {
    fn schedule(&self, task: Task, delay: Duration) {
        self.service.schedule(task, delay);
    }
}

impl Drop for ThreadPoolTaskRunner {
    fn drop(&mut self) {
        self.service.flush();
        self.service.shutdown();
        self.delayed.shutdown();
        tracing::debug!(runner = self.id.as_u64(), "Thread pool shut down");
    }
}
