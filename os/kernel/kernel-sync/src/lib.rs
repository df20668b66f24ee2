//! # Kernel synchronization primitives
//!
//! Two lock categories, matching the two ways kernel code holds shared state:
//!
//! - [`SpinLock`]: a short, non-blocking mutual-exclusion lock. A holder never
//!   sleeps and never performs I/O while holding one. Used for hash-bucket
//!   chains, free lists, and other data touched only inside brief critical
//!   sections.
//! - [`SleepLock`]: a blocking exclusive lock. This is the only lock type that
//!   may be held across a suspension point (e.g. a disk transfer); contending
//!   acquirers park on a wait queue instead of spinning.
//!
//! Both hand out RAII guards; releasing a lock is dropping its guard, so a
//! critical section cannot leak the lock on an early return or a panic.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

mod sleep_lock;
mod spin_lock;
mod wait;

pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
