//! Binary semaphore used to trigger out-of-cycle work.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A semaphore that holds at most one token. Extra gives are absorbed.
pub struct BinarySemaphore {
    token: Mutex<bool>,
    given: Condvar,
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl BinarySemaphore {
    pub const fn new() -> Self {
        Self {
            token: Mutex::new(false),
            given: Condvar::new(),
        }
    }

    /// Make the token available. Never blocks.
    pub fn give(&self) {
        *self.token.lock() = true;
        self.given.notify_one();
    }

    /// Take the token, waiting up to `timeout`. Returns `false` on timeout.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut token = self.token.lock();
        while !*token {
            match deadline {
                Some(deadline) => {
                    if self.given.wait_until(&mut token, deadline).timed_out() {
                        break;
                    }
                }
                None => self.given.wait(&mut token),
            }
        }
        core::mem::replace(&mut *token, false)
    }
}
