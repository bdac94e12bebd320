//! Scoped lock guard used by every shared component.
//!
//! [`Guarded`] owns its data and only hands it out while the lock is held,
//! either through a closure ([`Guarded::with`]) or through an RAII guard
//! ([`Guarded::lock`]). The lock is released on every exit path, including
//! early returns and unwinding.

use parking_lot::{Mutex, MutexGuard};

/// Mutual-exclusion wrapper with scoped acquisition.
#[derive(Debug, Default)]
pub struct Guarded<T> {
    inner: Mutex<T>,
}

impl<T> Guarded<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access and return its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Acquire the lock for a longer critical section.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn with_returns_closure_result() {
        let g = Guarded::new(41);
        let v = g.with(|n| {
            *n += 1;
            *n
        });
        assert_eq!(v, 42);
        assert_eq!(g.into_inner(), 42);
    }

    #[test]
    fn lock_is_released_after_early_return() {
        let g = Guarded::new(0u32);
        let attempt = |limit: u32| -> Result<(), ()> {
            let mut n = g.lock();
            *n += 1;
            if *n > limit {
                return Err(());
            }
            Ok(())
        };
        assert!(attempt(0).is_err());
        // A second acquisition would deadlock if the first guard leaked.
        assert!(attempt(5).is_ok());
    }

    #[test]
    fn concurrent_increments_are_serialised() {
        let g = Arc::new(Guarded::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        g.with(|n| *n += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(g.with(|n| *n), 4000);
    }
}
