//! Dedicated single-thread runner

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::item::Task;
use crate::runner::service::ServiceTaskRunner;
use crate::runner::{RunnerId, TaskRunner};
use std::time::Duration;

/// Runner executing every item on one dedicated thread
///
/// Items run strictly in (due time, sequence) order: an item due at `t1`
/// always completes before an item due at `t2 > t1` starts. Dropping the
/// runner runs work that is already due and discards the rest.
pub struct ThreadTaskRunner {
    service: ServiceTaskRunner,
}

impl ThreadTaskRunner {
    /// Start a runner thread named `thread_name`
    pub fn new(clock: Clock, thread_name: impl Into<String>) -> Result<Self, ConfigError> {
        let thread_name = thread_name.into();
        if thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }

        let id = RunnerId::new();
        let service = ServiceTaskRunner::start(id, clock, thread_name, Box::new(|task: Task| task()))?;
        tracing::debug!(runner = id.as_u64(), "Started runner thread");
        Ok(Self { service })
    }

    /// Number of items not yet run
    pub fn pending_count(&self) -> usize {
        self.service.pending_count()
    }
}

impl TaskRunner for ThreadTaskRunner {
    fn schedule(&self, task: Task, delay: Duration) {
        self.service.schedule(task, delay);
    }
}

impl Drop for ThreadTaskRunner {
    fn drop(&mut self) {
        self.service.flush();
        self.service.shutdown();
    }
}
