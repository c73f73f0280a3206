//! Single-use counting barrier
//!
//! Waiters block until the counter, set at construction, has been counted
//! down to zero. Unlike [`std::sync::Barrier`], the threads that count down
//! need not be the threads that wait.

use parking_lot::{Condvar, Mutex};

/// Counting rendezvous for fan-out/fan-in
pub struct Barrier {
    /// Outstanding count-downs
    counter: Mutex<usize>,
    /// Signalled once the counter reaches zero
    released: Condvar,
}

impl Barrier {
    /// Create a barrier expecting `counter` count-downs.
    ///
    /// # Panics
    ///
    /// Panics if `counter` is zero.
    pub fn new(counter: usize) -> Self {
        assert!(counter > 0, "Barrier counter must be positive");
        Self {
            counter: Mutex::new(counter),
            released: Condvar::new(),
        }
    }

    /// Decrement the counter, releasing every waiter when it reaches zero.
    ///
    /// # Panics
    ///
    /// Panics if the counter is already zero.
    pub fn count_down(&self) {
        let mut counter = self.counter.lock();
        assert!(*counter > 0, "Barrier counted down past zero");
        *counter -= 1;
        if *counter == 0 {
            self.released.notify_all();
        }
    }

    /// Block until the counter reaches zero
    pub fn wait(&self) {
        let mut counter = self.counter.lock();
        while *counter > 0 {
            self.released.wait(&mut counter);
        }
    }

    /// Count down, then wait for the remaining participants
    pub fn count_down_and_wait(&self) {
        self.count_down();
        self.wait();
    }

    /// Remaining count-downs
    pub fn count(&self) -> usize {
        *self.counter.lock()
    }

    /// Whether the barrier has been released
    pub fn is_released(&self) -> bool {
        self.count() == 0
    }
}
