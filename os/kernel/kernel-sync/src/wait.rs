//! Epoch-counted wait queue backing [`SleepLock`](crate::SleepLock).
//!
//! The queue counts wake-ups rather than waiters. A prospective sleeper reads
//! the epoch *before* testing its wake condition and then waits for the epoch
//! to move past the value it saw; a wake-up between the test and the wait
//! advances the epoch first, so the sleeper returns immediately and re-tests.
//! This is the futex protocol, minus the kernel.

#[cfg(any(test, doctest, feature = "std"))]
mod imp {
    use std::sync::{Condvar, Mutex};

    /// Condvar-backed queue: waiters park, `wake_all` unparks every one.
    pub struct WaitQueue {
        epoch: Mutex<usize>,
        wake: Condvar,
    }

    impl WaitQueue {
        pub const fn new() -> Self {
            Self {
                epoch: Mutex::new(0),
                wake: Condvar::new(),
            }
        }

        pub fn epoch(&self) -> usize {
            *self.epoch.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        /// Park until the epoch moves past `seen`.
        pub fn wait(&self, seen: usize) {
            let mut epoch = self
                .epoch
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            while *epoch == seen {
                epoch = self
                    .wake
                    .wait(epoch)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }

        pub fn wake_all(&self) {
            let mut epoch = self
                .epoch
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *epoch = epoch.wrapping_add(1);
            drop(epoch);
            self.wake.notify_all();
        }
    }
}

#[cfg(not(any(test, doctest, feature = "std")))]
mod imp {
    use core::hint::spin_loop;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Freestanding fallback: waiters spin on the epoch word.
    ///
    /// TODO: route `wait` through the scheduler's sleep queue once task
    /// suspension exists, so waiters yield the core instead of burning it.
    pub struct WaitQueue {
        epoch: AtomicUsize,
    }

    impl WaitQueue {
        pub const fn new() -> Self {
            Self {
                epoch: AtomicUsize::new(0),
            }
        }

        pub fn epoch(&self) -> usize {
            self.epoch.load(Ordering::Acquire)
        }

        pub fn wait(&self, seen: usize) {
            while self.epoch.load(Ordering::Acquire) == seen {
                spin_loop();
            }
        }

        pub fn wake_all(&self) {
            self.epoch.fetch_add(1, Ordering::Release);
        }
    }
}

pub(crate) use imp::WaitQueue;
