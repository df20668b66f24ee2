use crate::wait::WaitQueue;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A blocking exclusive lock.
///
/// The counterpart to [`SpinLock`](crate::SpinLock) for long holds: the owner
/// may keep the guard across a suspension point (most notably a disk
/// transfer), and contending acquirers park on a wait queue instead of
/// spinning. This is the **only** lock type that may be held while sleeping.
///
/// Ownership is represented by the [`SleepLockGuard`]: holding the guard *is*
/// the proof of holding the lock, so operations that require the lock take the
/// guard and cannot be called without it.
///
/// # Protocol
///
/// Acquire snapshots the queue epoch, then attempts a CAS on the `locked`
/// flag; on failure it waits for the epoch to advance and retries. Release
/// clears the flag and advances the epoch, which wakes every waiter exactly
/// once. A release between the snapshot and the wait advances the epoch first,
/// so no wake-up can be lost.
pub struct SleepLock<T> {
    locked: AtomicBool,
    queue: WaitQueue,
    data: UnsafeCell<T>,
}

// Safety: exclusive access is enforced by `locked`; only T: Send may cross tasks.
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            queue: WaitQueue::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Single acquisition attempt; never blocks.
    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then(|| SleepLockGuard { lock: self })
    }

    /// Block until the lock is acquired.
    ///
    /// Must not be called while holding any [`SpinLock`](crate::SpinLock);
    /// the wait can suspend the current task.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            let seen = self.queue.epoch();
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            self.queue.wait(seen);
        }
    }

    /// Direct access through `&mut self`; no other holder can exist.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Whether the lock is currently held (racy; diagnostics only).
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.lock.queue.wake_all();
    }
}
