//! Bounded FIFO queue with blocking, timed and non-blocking access.
//!
//! Storage is an `embassy-sync` channel, the same primitive the rest of the
//! firmware uses for inter-task traffic. Blocking waits are layered on top
//! with a mutex/condvar "doorbell": producers ring `readable` after a push,
//! consumers ring `writable` after a pop.
//!
//! ```text
//!   producer ──try_send──▶ [ Channel<T, N> ] ──try_receive──▶ consumer
//!        │                                                   ▲
//!        └────────── gate + readable/writable condvars ──────┘
//! ```
//!
//! A waiter checks the channel while holding the gate and only then parks
//! on the condvar, and a notifier takes the gate before ringing, so a
//! wakeup can never slip in between the check and the park.

use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use parking_lot::{Condvar, Mutex, MutexGuard};

pub struct Queue<T, const N: usize> {
    chan: Channel<CriticalSectionRawMutex, T, N>,
    gate: Mutex<()>,
    readable: Condvar,
    writable: Condvar,
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            chan: Channel::new(),
            gate: Mutex::new(()),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Enqueue without blocking. Returns the item back if the queue is full.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        match self.chan.try_send(item) {
            Ok(()) => {
                self.ring(&self.readable);
                Ok(())
            }
            Err(TrySendError::Full(item)) => Err(item),
        }
    }

    /// Enqueue, waiting up to `timeout` for a free slot.
    pub fn send_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        let mut item = match self.try_send(item) {
            Ok(()) => return Ok(()),
            Err(item) => item,
        };
        if timeout.is_zero() {
            return Err(item);
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut gate = self.gate.lock();
        loop {
            match self.chan.try_send(item) {
                Ok(()) => {
                    drop(gate);
                    self.ring(&self.readable);
                    return Ok(());
                }
                Err(TrySendError::Full(back)) => item = back,
            }
            if Self::park(&self.writable, &mut gate, deadline) {
                return match self.chan.try_send(item) {
                    Ok(()) => {
                        drop(gate);
                        self.ring(&self.readable);
                        Ok(())
                    }
                    Err(TrySendError::Full(back)) => Err(back),
                };
            }
        }
    }

    /// Dequeue without blocking.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.chan.try_receive().ok()?;
        self.ring(&self.writable);
        Some(item)
    }

    /// Dequeue, waiting up to `timeout` for an item.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(item) = self.try_recv() {
            return Some(item);
        }
        if timeout.is_zero() {
            return None;
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut gate = self.gate.lock();
        loop {
            if let Ok(item) = self.chan.try_receive() {
                drop(gate);
                self.ring(&self.writable);
                return Some(item);
            }
            if Self::park(&self.readable, &mut gate, deadline) {
                let item = self.chan.try_receive().ok();
                drop(gate);
                if item.is_some() {
                    self.ring(&self.writable);
                }
                return item;
            }
        }
    }

    /// Dequeue, waiting indefinitely.
    pub fn recv(&self) -> T {
        loop {
            if let Some(item) = self.recv_timeout(Duration::MAX) {
                return item;
            }
        }
    }

    /// Discard every queued item and return how many were dropped.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.chan.try_receive().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            let _gate = self.gate.lock();
            self.writable.notify_all();
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chan.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn ring(&self, bell: &Condvar) {
        let _gate = self.gate.lock();
        bell.notify_one();
    }

    /// Park on `bell`. Returns `true` once the deadline has passed.
    fn park(bell: &Condvar, gate: &mut MutexGuard<'_, ()>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => bell.wait_until(gate, deadline).timed_out(),
            None => {
                bell.wait(gate);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order_is_preserved() {
        let q: Queue<u32, 4> = Queue::new();
        for i in 0..4 {
            q.try_send(i).unwrap();
        }
        let out: Vec<u32> = std::iter::from_fn(|| q.try_recv()).collect();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn try_send_on_full_returns_item_and_keeps_contents() {
        let q: Queue<u32, 2> = Queue::new();
        q.try_send(10).unwrap();
        q.try_send(11).unwrap();
        assert_eq!(q.try_send(12), Err(12));
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_recv(), Some(10));
        assert_eq!(q.try_recv(), Some(11));
    }

    #[test]
    fn recv_timeout_expires_on_empty_queue() {
        let q: Queue<u8, 1> = Queue::new();
        let start = Instant::now();
        assert_eq!(q.recv_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn send_timeout_gives_up_when_full() {
        let q: Queue<u8, 1> = Queue::new();
        q.try_send(1).unwrap();
        assert_eq!(q.send_timeout(2, Duration::from_millis(20)), Err(2));
    }

    #[test]
    fn blocked_receiver_wakes_on_send() {
        let q: Arc<Queue<u32, 2>> = Arc::new(Queue::new());
        let rx = Arc::clone(&q);
        let h = std::thread::spawn(move || rx.recv_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        q.try_send(7).unwrap();
        assert_eq!(h.join().unwrap(), Some(7));
    }

    #[test]
    fn blocked_sender_wakes_on_receive() {
        let q: Arc<Queue<u32, 1>> = Arc::new(Queue::new());
        q.try_send(1).unwrap();
        let tx = Arc::clone(&q);
        let h = std::thread::spawn(move || tx.send_timeout(2, Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(q.try_recv(), Some(1));
        assert_eq!(h.join().unwrap(), Ok(()));
        assert_eq!(q.try_recv(), Some(2));
    }

    #[test]
    fn drain_empties_queue() {
        let q: Queue<u8, 3> = Queue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        assert_eq!(q.drain(), 2);
        assert!(q.is_empty());
        assert_eq!(q.capacity(), 3);
    }
}
