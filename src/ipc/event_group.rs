//! Bitmask event signal.
//!
//! Any number of producers may [`set`](EventGroup::set) bits; a waiter
//! wakes when any bit of its mask is set and clears the bits it observed.
//! Several producers setting the same bit between two wakes collapse into a
//! single wake, so consumers must drain their queues fully on every wake.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventBits: u32 {
        /// A state notification was enqueued.
        const STATE_READY = 1 << 0;
        /// A log line was enqueued.
        const LOG_READY = 1 << 1;
    }
}

pub struct EventGroup {
    bits: Mutex<EventBits>,
    changed: Condvar,
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGroup {
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(EventBits::empty()),
            changed: Condvar::new(),
        }
    }

    pub fn set(&self, bits: EventBits) {
        let mut current = self.bits.lock();
        current.insert(bits);
        self.changed.notify_all();
    }

    pub fn clear(&self, bits: EventBits) {
        self.bits.lock().remove(bits);
    }

    pub fn get(&self) -> EventBits {
        *self.bits.lock()
    }

    /// Wait until any bit in `mask` is set or `timeout` passes.
    ///
    /// Returns the observed bits of `mask` (empty on timeout) and clears
    /// them before returning.
    pub fn wait_any(&self, mask: EventBits, timeout: Duration) -> EventBits {
        let deadline = Instant::now().checked_add(timeout);
        let mut current = self.bits.lock();
        loop {
            let hit = *current & mask;
            if !hit.is_empty() {
                current.remove(hit);
                return hit;
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut current, deadline).timed_out() {
                        let hit = *current & mask;
                        current.remove(hit);
                        return hit;
                    }
                }
                None => self.changed.wait(&mut current),
            }
        }
    }
}
