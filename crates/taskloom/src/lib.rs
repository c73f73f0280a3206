//! Taskloom: in-process task scheduling
//!
//! This crate provides deterministic, cancellable deferred execution:
//! - **Runners**: a caller-pumped [`PollingTaskRunner`], a dedicated-thread
//!   [`ThreadTaskRunner`], and an elastic [`ThreadPoolTaskRunner`]
//! - **Timer**: [`OneShotTimer`], a single delayed callback that is safe to drop
//!   while its fire is still pending
//! - **Barrier**: a single-use counting rendezvous for fan-out/fan-in
//!
//! Every clock-driven component takes an injected [`Clock`], so tests can drive
//! time with a [`ManualClock`].
//!
//! # Example
//!
//! ```rust,ignore
//! use taskloom::{monotonic_clock, TaskRunnerExt, ThreadPoolTaskRunner};
//! use std::time::Duration;
//!
//! let pool = ThreadPoolTaskRunner::new(monotonic_clock(), 4, Duration::from_secs(10));
//! pool.post_delayed_task(|| println!("later"), Duration::from_millis(5));
//! pool.apply_task_sync(|i| println!("iteration {}", i), 8);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod barrier;
pub mod clock;
pub mod error;
pub mod item;
pub mod runner;
pub mod timer;

pub use barrier::Barrier;
pub use clock::{monotonic_clock, Clock, ManualClock};
pub use error::ConfigError;
pub use item::{Item, Task};
pub use runner::{
    ApplyFn, PollingTaskRunner, PoolStats, TaskRunner, TaskRunnerExt, ThreadPoolConfig,
    ThreadPoolTaskRunner, ThreadTaskRunner, DEFAULT_KEEP_ALIVE,
};
pub use timer::OneShotTimer;
