//! Recoverable construction errors
//!
//! Contract violations (zero iterations, zero barrier counter, firing an idle
//! timer) panic at the call site. Only thread-pool construction, which
//! depends on configuration and the OS, reports errors as values.

use std::io;

/// Errors from validating a [`ThreadPoolConfig`](crate::ThreadPoolConfig) or
/// starting a runner's threads
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `max_threads` was zero
    #[error("max_threads must be at least 1")]
    ZeroThreads,

    /// `keep_alive` was zero
    #[error("keep_alive must be non-zero")]
    ZeroKeepAlive,

    /// `thread_name` was empty
    #[error("thread_name must not be empty")]
    EmptyThreadName,

    /// The OS refused to start a runner thread
    #[error("Failed to spawn runner thread: {0}")]
    Spawn(#[from] io::Error),
}
